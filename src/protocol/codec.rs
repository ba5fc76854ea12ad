use super::types::{Message, StepStatus};
use super::{ProtocolError, Result, CANCEL_FRAME, HANDSHAKE_FRAME, JOB_PREFIX};
use crate::session::models::DispenseJob;

/// Encode a dispensing job into the outbound command frame
/// Format: D:<station>=<amount 2dp>,<station>=<amount 2dp>,...
pub fn encode_job(job: &DispenseJob) -> String {
    let body = job
        .steps
        .iter()
        .map(|step| format!("{}={:.2}", step.station_id, step.target))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{}", JOB_PREFIX, body)
}

pub fn encode_cancel() -> &'static str {
    CANCEL_FRAME
}

pub fn encode_handshake() -> &'static str {
    HANDSHAKE_FRAME
}

/// Parse an outbound job frame back into (station, amount) pairs.
/// The robot side of the link reads commands this way.
pub fn parse_job_frame(frame: &str) -> Result<Vec<(u32, f64)>> {
    let body = frame
        .strip_prefix(JOB_PREFIX)
        .ok_or_else(|| ProtocolError::InvalidJobFrame(format!("missing {} prefix", JOB_PREFIX)))?;
    if body.is_empty() {
        return Err(ProtocolError::InvalidJobFrame("no stations".to_string()));
    }

    body.split(',')
        .map(|entry| {
            let (station, amount) = entry
                .split_once('=')
                .ok_or_else(|| ProtocolError::InvalidJobFrame(format!("entry {:?} has no '='", entry)))?;
            let station = station
                .parse::<u32>()
                .map_err(|_| ProtocolError::InvalidJobFrame(format!("invalid station {:?}", station)))?;
            let amount = amount
                .parse::<f64>()
                .map_err(|_| ProtocolError::InvalidJobFrame(format!("invalid amount {:?}", amount)))?;
            Ok((station, amount))
        })
        .collect()
}

/// Classify and parse one inbound frame.
///
/// `$<type>=<value>` is a system status, `S<step>=<state>;` a step state and
/// `W<step>=<weight>;` a running weight. Anything else is malformed.
pub fn decode(frame: &str) -> Result<Message> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ProtocolError::malformed(frame, "empty frame"))?;
    let rest = chars.as_str();

    match kind {
        '$' => decode_system(frame, rest),
        'S' | 'W' => decode_step(frame, kind, rest),
        _ => Err(ProtocolError::malformed(frame, "unknown frame prefix")),
    }
}

fn decode_system(frame: &str, rest: &str) -> Result<Message> {
    let (kind, value) = rest
        .split_once('=')
        .ok_or_else(|| ProtocolError::malformed(frame, "status frame has no '='"))?;
    if kind.is_empty() || value.is_empty() {
        return Err(ProtocolError::malformed(frame, "status frame needs a type and a value"));
    }

    match kind.parse::<i64>() {
        Ok(0) => Ok(Message::TextStatus(value.to_string())),
        Ok(1) => Ok(Message::CupStatus(value == "1")),
        _ => Ok(Message::Unknown(frame.to_string())),
    }
}

fn decode_step(frame: &str, kind: char, rest: &str) -> Result<Message> {
    let parts: Vec<&str> = rest.split('=').filter(|p| !p.is_empty()).collect();
    if parts.len() != 2 {
        return Err(ProtocolError::malformed(frame, "expected <step>=<payload>"));
    }

    let step = parts[0]
        .trim()
        .parse::<usize>()
        .map_err(|_| ProtocolError::malformed(frame, "step index is not a non-negative integer"))?;

    let payload = parts[1].trim();
    let payload = payload.strip_suffix(';').unwrap_or(payload).trim_end();

    if kind == 'W' {
        // A garbled weight is read as zero rather than dropping the frame
        let weight = match payload.parse::<f64>() {
            Ok(w) if w.is_finite() => w,
            _ => {
                log::debug!("Unreadable weight {:?} for step {}, using 0", payload, step);
                0.0
            }
        };
        return Ok(Message::WeightUpdate { step, weight });
    }

    let status = match payload {
        "P" => StepStatus::Processing,
        "C" => StepStatus::Complete,
        _ => StepStatus::Failed,
    };
    Ok(Message::StateUpdate { step, status })
}
