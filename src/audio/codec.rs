use thiserror::Error;

/// Errors produced while decoding a single audio frame.
///
/// Decode failures are per-frame: callers skip the frame, count the
/// failure, and keep the session running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty audio frame")]
    EmptyFrame,
    #[error("invalid base64 media payload: {0}")]
    InvalidPayload(String),
}

/// Decode a G.711 mu-law frame into linear 16-bit PCM.
///
/// Telephony audio arrives as 8-bit mu-law companded samples at 8kHz.
/// Each input byte expands to exactly one i16 sample, so the output
/// length always equals the input length. Decoding is a pure table-free
/// transform: the same frame always yields the same samples.
pub fn decode_mulaw(frame: &[u8]) -> Result<Vec<i16>, DecodeError> {
    if frame.is_empty() {
        return Err(DecodeError::EmptyFrame);
    }

    Ok(frame.iter().map(|&byte| mulaw_to_linear(byte)).collect())
}

/// Expand one mu-law byte to a linear sample (G.711).
fn mulaw_to_linear(byte: u8) -> i16 {
    // Mu-law stores samples inverted on the wire.
    let byte = !byte;

    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    // Bias of 0x84 (132) is folded in during encoding and removed here.
    let magnitude = ((((mantissa as i32) << 3) + 0x84) << exponent) - 0x84;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}
