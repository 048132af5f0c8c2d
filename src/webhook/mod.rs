//! Inbound webhook handling: envelope parsing, event classification, and
//! signature verification.
//!
//! The signing service delivers events at least once, so everything in here
//! must stay safe under duplicates. Parsing and classification are pure; the
//! server layer decides what each parsed event triggers.

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{EventFamily, EventKind};
pub use parser::{parse_envelope, ParseError, WebhookEvent};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
    SIGNATURE_HEADER,
};
