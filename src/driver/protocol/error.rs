use super::message::Headers;

/// Severity levels used by `ErrorResponse` and `LogMessage`.
pub mod severity {
    pub const DEBUG: u8 = 20;
    pub const INFO: u8 = 40;
    pub const NOTICE: u8 = 60;
    pub const WARNING: u8 = 80;
    pub const ERROR: u8 = 120;
    pub const FATAL: u8 = 200;
    pub const PANIC: u8 = 255;
}

/// Well-known `ErrorResponse` attribute keys.
pub mod attr {
    pub const HINT: u16 = 0x0001;
    pub const DETAILS: u16 = 0x0002;
    pub const SERVER_TRACEBACK: u16 = 0x0101;
    pub const POSITION_START: u16 = 0xFFF1;
    pub const POSITION_END: u16 = 0xFFF2;
    pub const LINE_START: u16 = 0xFFF3;
    pub const COLUMN_START: u16 = 0xFFF4;
}

/// A decoded `ErrorResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub severity: u8,
    pub code: u32,
    pub message: String,
    pub attributes: Headers,
}

impl ServerError {
    /// FATAL and PANIC errors terminate the session server-side.
    pub fn is_fatal(&self) -> bool {
        self.severity >= severity::FATAL
    }

    fn text_attr(&self, key: u16) -> Option<&str> {
        self.attributes
            .get(&key)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn hint(&self) -> Option<&str> {
        self.text_attr(attr::HINT)
    }

    pub fn details(&self) -> Option<&str> {
        self.text_attr(attr::DETAILS)
    }

    pub fn server_traceback(&self) -> Option<&str> {
        self.text_attr(attr::SERVER_TRACEBACK)
    }

    /// `(line, column)` of the error within the query text, one-based.
    pub fn position(&self) -> Option<(u32, u32)> {
        let line = self.text_attr(attr::LINE_START)?.parse().ok()?;
        let column = self.text_attr(attr::COLUMN_START)?.parse().ok()?;
        Some((line, column))
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code 0x{:08x})", self.message, self.code)?;
        if let Some(hint) = self.hint() {
            write!(f, "; hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}
