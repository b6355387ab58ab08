//! Granular query flow
//!
//! With a cached codec a query costs one round trip (`OptimisticExecute`).
//! With cached descriptors but no codec for the destination type, the codec
//! is built locally first. Otherwise the statement is prepared, described if
//! its descriptor IDs are unknown, and executed: up to three round trips.

use std::any::TypeId;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use uuid::Uuid;

use super::query::{Destination, Query};
use super::{unexpected, Connection};
use crate::cache::CodecKey;
use crate::codec::{build_codec, Codec, Decoder, Queryable, Value};
use crate::descriptor::{parse_descriptor_pair, DescriptorPair};
use crate::driver::protocol::{Cardinality, Command, IoFormat, Reader, Response};
use crate::error::{DriverError, DriverResult};

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run a query and replace the contents of `out` with its results.
    pub async fn query<T>(&mut self, command: &str, args: &Value, out: &mut Vec<T>) -> DriverResult<()>
    where
        T: Queryable + Default + 'static,
    {
        let query = self.new_query(command, Cardinality::Many, IoFormat::Binary, args);
        self.run(&query, Destination::Many(out)).await
    }

    /// Run a query expected to return at most one result and decode it into
    /// `out`. Returns [`DriverError::ZeroResults`] if there is none.
    pub async fn query_single<T>(&mut self, command: &str, args: &Value, out: &mut T) -> DriverResult<()>
    where
        T: Queryable + Default + 'static,
    {
        let query = self.new_query(command, Cardinality::AtMostOne, IoFormat::Binary, args);
        self.run(&query, Destination::One(out)).await
    }

    /// Run a query and return all results as one JSON array.
    pub async fn query_json(&mut self, command: &str, args: &Value) -> DriverResult<String> {
        let query = self.new_query(command, Cardinality::Many, IoFormat::Json, args);
        let mut out = String::new();
        self.run(&query, Destination::One(&mut out)).await?;
        Ok(out)
    }

    /// Run a query expected to return at most one result, as JSON.
    pub async fn query_single_json(&mut self, command: &str, args: &Value) -> DriverResult<String> {
        let query = self.new_query(command, Cardinality::AtMostOne, IoFormat::Json, args);
        let mut out = String::new();
        self.run(&query, Destination::One(&mut out)).await?;
        Ok(out)
    }

    fn new_query(&self, command: &str, cardinality: Cardinality, format: IoFormat, args: &Value) -> Query {
        Query::new(command, cardinality)
            .format(format)
            .headers(self.config.headers())
            .args(args.clone())
    }

    /// Run `query`, decoding results into `out`.
    ///
    /// Fatal errors leave the connection unusable; every other error leaves it
    /// ready for the next query.
    pub async fn run<T>(&mut self, query: &Query, mut out: Destination<'_, T>) -> DriverResult<()>
    where
        T: Queryable + Default + 'static,
    {
        self.check_usable()?;
        let result = self.granular_flow(query, &mut out).await;
        self.guard(result)
    }

    async fn granular_flow<T>(&mut self, query: &Query, out: &mut Destination<'_, T>) -> DriverResult<()>
    where
        T: Queryable + Default + 'static,
    {
        let key = query.codec_key(TypeId::of::<T>());

        if let Some(codec) = self.cache.get_codec(&key) {
            debug!(command = %query.command, "Codec cache hit");
            return self.optimistic(query, &key, codec, out).await;
        }

        if let Some(descriptors) = self.cache.get_query_descriptors(&key.query) {
            debug!(command = %query.command, "Descriptor cache hit, building codec");
            let codec = self.cache.put_codec(key.clone(), build_codec(&descriptors, &T::shape())?);
            return self.optimistic(query, &key, codec, out).await;
        }

        self.pessimistic(query, &key, out).await
    }

    async fn optimistic<T>(
        &mut self,
        query: &Query,
        key: &CodecKey,
        codec: Arc<Codec>,
        out: &mut Destination<'_, T>,
    ) -> DriverResult<()>
    where
        T: Queryable + Default + 'static,
    {
        let arguments = match codec.encoder.encode_arguments(&query.args) {
            Ok(arguments) => arguments,
            Err(err) => {
                // the cached encoder may predate a change to the argument types
                debug!("Cached encoder rejected arguments, preparing again: {}", err);
                self.cache.invalidate_query(&key.query);
                return self.pessimistic(query, key, out).await;
            }
        };

        self.send(&Command::OptimisticExecute {
            headers: &query.headers,
            format: query.format,
            cardinality: query.cardinality,
            command: &query.command,
            input_id: codec.input_id,
            output_id: codec.output_id,
            arguments: &arguments,
        })
        .await?;

        let Some(descriptors) = self.read_rows(query, &codec.decoder, out).await? else {
            return Ok(());
        };

        debug!(command = %query.command, "Server reported new type descriptors");
        self.cache.invalidate_query(&key.query);
        let descriptors = Arc::new(descriptors);
        self.cache.put_descriptors(key.query.clone(), descriptors.clone());
        let codec = self.cache.put_codec(key.clone(), build_codec(&descriptors, &T::shape())?);
        self.execute_prepared(query, &codec, out).await
    }

    async fn pessimistic<T>(
        &mut self,
        query: &Query,
        key: &CodecKey,
        out: &mut Destination<'_, T>,
    ) -> DriverResult<()>
    where
        T: Queryable + Default + 'static,
    {
        let ids = self.prepare(query).await?;
        let descriptors = match self.cache.get_descriptors_by_id(ids) {
            Some(descriptors) => descriptors,
            None => Arc::new(self.describe(query).await?),
        };
        self.cache.put_descriptors(key.query.clone(), descriptors.clone());

        let codec = self.cache.put_codec(key.clone(), build_codec(&descriptors, &T::shape())?);
        self.execute_prepared(query, &codec, out).await
    }

    async fn prepare(&mut self, query: &Query) -> DriverResult<(Uuid, Uuid)> {
        self.send(&Command::Prepare {
            headers: &query.headers,
            format: query.format,
            cardinality: query.cardinality,
            command: &query.command,
        })
        .await?;

        let mut ids = None;
        self.drain(|resp| match resp {
            Response::PrepareComplete {
                input_id,
                output_id,
                ..
            } => {
                ids = Some((input_id, output_id));
                Ok(())
            }
            other => Err(unexpected(&other)),
        })
        .await?;

        ids.ok_or_else(|| {
            DriverError::ProtocolViolation("Prepare finished without PrepareComplete".to_string())
        })
    }

    async fn describe(&mut self, query: &Query) -> DriverResult<DescriptorPair> {
        self.send(&Command::DescribeStatement {
            headers: &query.headers,
        })
        .await?;

        let mut descriptors = None;
        self.drain(|resp| match resp {
            Response::CommandDataDescription {
                input_id,
                input,
                output_id,
                output,
                ..
            } => {
                descriptors = Some(parse_descriptor_pair(input_id, &input, output_id, &output)?);
                Ok(())
            }
            other => Err(unexpected(&other)),
        })
        .await?;

        descriptors.ok_or_else(|| {
            DriverError::ProtocolViolation(
                "DescribeStatement finished without CommandDataDescription".to_string(),
            )
        })
    }

    async fn execute_prepared<T>(
        &mut self,
        query: &Query,
        codec: &Codec,
        out: &mut Destination<'_, T>,
    ) -> DriverResult<()>
    where
        T: Queryable + Default + 'static,
    {
        let arguments = codec.encoder.encode_arguments(&query.args)?;
        self.send(&Command::Execute {
            headers: &query.headers,
            arguments: &arguments,
        })
        .await?;

        match self.read_rows(query, &codec.decoder, out).await? {
            Some(_) => Err(DriverError::ProtocolViolation(
                "CommandDataDescription in reply to Execute".to_string(),
            )),
            None => Ok(()),
        }
    }

    /// Collect the rows of one execution.
    ///
    /// Returns the new descriptors if the server answered with a
    /// `CommandDataDescription` instead of running the statement.
    async fn read_rows<T>(
        &mut self,
        query: &Query,
        decoder: &Decoder,
        out: &mut Destination<'_, T>,
    ) -> DriverResult<Option<DescriptorPair>>
    where
        T: Queryable + Default,
    {
        if let Destination::Many(rows) = out {
            rows.clear();
        }

        let mut received = 0usize;
        let mut described = None;
        self.drain(|resp| match resp {
            Response::Data(data) => {
                received += 1;
                decode_row(decoder, &data, out)
            }
            Response::CommandComplete { status } => {
                debug!(status = %status, rows = received, "Command complete");
                Ok(())
            }
            Response::CommandDataDescription {
                input_id,
                input,
                output_id,
                output,
                ..
            } => {
                described = Some(parse_descriptor_pair(input_id, &input, output_id, &output)?);
                Ok(())
            }
            other => Err(unexpected(&other)),
        })
        .await?;

        if described.is_none() && received == 0 && query.expects_one() {
            return Err(DriverError::ZeroResults);
        }
        Ok(described)
    }
}

fn decode_row<T>(decoder: &Decoder, data: &[u8], out: &mut Destination<'_, T>) -> DriverResult<()>
where
    T: Queryable + Default,
{
    let mut r = Reader::new(data);
    match out {
        Destination::One(target) => decoder.decode(&mut r, target.slot()),
        Destination::Many(rows) => {
            let mut row = T::default();
            decoder.decode(&mut r, row.slot())?;
            rows.push(row);
            Ok(())
        }
    }
}
