//! Transport layer: wire-format details (envelope decoding, body encoding).

mod body;
mod envelope;

pub use body::{EncodeError, FormField, build_form, encode_json_body, plan_multipart};
pub use envelope::{EnvelopeError, decode_envelope, decode_envelope_unit};
