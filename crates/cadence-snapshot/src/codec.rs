//! Binary encode/decode for snapshot blobs.
//!
//! All integers are little-endian. Strings and arrays are length-prefixed
//! with a `u32`. Optional values carry a one-byte presence flag. There is
//! no compression and no padding.

use std::io::{Read, Write};

use crate::error::SnapshotError;
use crate::hash::checksum;
use crate::types::{Blob, EventRecord, JobRecord, LoopRecord, SnapshotImage, StateRecord};
use crate::{FORMAT_VERSION, MAGIC};

/// Magic, version and fingerprint.
const PREAMBLE_LEN: usize = 4 + 1 + 8;
/// Trailing checksum.
const CHECKSUM_LEN: usize = 8;

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), SnapshotError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a bool as one byte.
pub fn write_bool(w: &mut dyn Write, v: bool) -> Result<(), SnapshotError> {
    write_u8(w, u8::from(v))
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), SnapshotError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), SnapshotError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i64.
pub fn write_i64_le(w: &mut dyn Write, v: i64) -> Result<(), SnapshotError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f64.
pub fn write_f64_le(w: &mut dyn Write, v: f64) -> Result<(), SnapshotError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), SnapshotError> {
    write_u32_le(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Write a length-prefixed f64 array.
pub fn write_f64_slice(w: &mut dyn Write, values: &[f64]) -> Result<(), SnapshotError> {
    write_u32_le(w, values.len() as u32)?;
    for &v in values {
        write_f64_le(w, v)?;
    }
    Ok(())
}

fn write_opt_i64(w: &mut dyn Write, v: Option<i64>) -> Result<(), SnapshotError> {
    match v {
        Some(v) => {
            write_u8(w, 1)?;
            write_i64_le(w, v)
        }
        None => write_u8(w, 0),
    }
}

fn write_opt_f64(w: &mut dyn Write, v: Option<f64>) -> Result<(), SnapshotError> {
    match v {
        Some(v) => {
            write_u8(w, 1)?;
            write_f64_le(w, v)
        }
        None => write_u8(w, 0),
    }
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, SnapshotError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a bool, rejecting bytes other than 0 and 1.
pub fn read_bool(r: &mut dyn Read) -> Result<bool, SnapshotError> {
    match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(SnapshotError::Malformed {
            detail: format!("invalid bool byte {other}"),
        }),
    }
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, SnapshotError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, SnapshotError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a little-endian i64.
pub fn read_i64_le(r: &mut dyn Read) -> Result<i64, SnapshotError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Read a little-endian f64.
pub fn read_f64_le(r: &mut dyn Read) -> Result<f64, SnapshotError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, SnapshotError> {
    let len = read_u32_le(r)? as usize;
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(SnapshotError::Truncated);
    }
    String::from_utf8(buf).map_err(|e| SnapshotError::Malformed {
        detail: format!("invalid UTF-8 string: {e}"),
    })
}

/// Read a length-prefixed f64 array.
pub fn read_f64_vec(r: &mut dyn Read) -> Result<Vec<f64>, SnapshotError> {
    let len = read_u32_le(r)? as usize;
    // A corrupt length must not drive a huge allocation up front.
    let mut out = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        out.push(read_f64_le(r)?);
    }
    Ok(out)
}

fn read_opt_i64(r: &mut dyn Read) -> Result<Option<i64>, SnapshotError> {
    Ok(if read_bool(r)? {
        Some(read_i64_le(r)?)
    } else {
        None
    })
}

fn read_opt_f64(r: &mut dyn Read) -> Result<Option<f64>, SnapshotError> {
    Ok(if read_bool(r)? {
        Some(read_f64_le(r)?)
    } else {
        None
    })
}

fn read_count(r: &mut dyn Read) -> Result<usize, SnapshotError> {
    Ok(read_u32_le(r)? as usize)
}

// ── Record encode/decode ────────────────────────────────────────

fn encode_job(w: &mut dyn Write, job: &JobRecord) -> Result<(), SnapshotError> {
    write_length_prefixed_str(w, &job.name)?;
    write_u8(w, job.class)?;
    write_u32_le(w, job.phase)?;
    write_u32_le(w, job.cycle_num)?;
    write_u32_le(w, job.cycle_den)?;
    write_i64_le(w, job.next_call)?;
    write_opt_i64(w, job.last_call)?;
    write_bool(w, job.enabled)?;
    write_bool(w, job.degraded)?;
    write_u64_le(w, job.run_count)?;
    write_u64_le(w, job.error_count)?;
    Ok(())
}

fn decode_job(r: &mut dyn Read) -> Result<JobRecord, SnapshotError> {
    Ok(JobRecord {
        name: read_length_prefixed_str(r)?,
        class: read_u8(r)?,
        phase: read_u32_le(r)?,
        cycle_num: read_u32_le(r)?,
        cycle_den: read_u32_le(r)?,
        next_call: read_i64_le(r)?,
        last_call: read_opt_i64(r)?,
        enabled: read_bool(r)?,
        degraded: read_bool(r)?,
        run_count: read_u64_le(r)?,
        error_count: read_u64_le(r)?,
    })
}

fn encode_loop(w: &mut dyn Write, lp: &LoopRecord) -> Result<(), SnapshotError> {
    write_length_prefixed_str(w, &lp.name)?;
    write_i64_le(w, lp.time_tics)?;
    write_opt_f64(w, lp.h_next)?;
    write_f64_le(w, lp.history_h)?;
    write_u32_le(w, lp.history.len() as u32)?;
    for f in &lp.history {
        write_f64_slice(w, f)?;
    }
    write_u64_le(w, lp.steps)?;
    Ok(())
}

fn decode_loop(r: &mut dyn Read) -> Result<LoopRecord, SnapshotError> {
    let name = read_length_prefixed_str(r)?;
    let time_tics = read_i64_le(r)?;
    let h_next = read_opt_f64(r)?;
    let history_h = read_f64_le(r)?;
    let depth = read_count(r)?;
    let mut history = Vec::with_capacity(depth.min(16));
    for _ in 0..depth {
        history.push(read_f64_vec(r)?);
    }
    Ok(LoopRecord {
        name,
        time_tics,
        h_next,
        history_h,
        history,
        steps: read_u64_le(r)?,
    })
}

fn encode_event(w: &mut dyn Write, ev: &EventRecord) -> Result<(), SnapshotError> {
    write_length_prefixed_str(w, &ev.name)?;
    write_bool(w, ev.enabled)?;
    write_bool(w, ev.degraded)?;
    write_opt_f64(w, ev.last_value)?;
    write_u64_le(w, ev.fire_count)?;
    write_opt_f64(w, ev.last_fired)?;
    Ok(())
}

fn decode_event(r: &mut dyn Read) -> Result<EventRecord, SnapshotError> {
    Ok(EventRecord {
        name: read_length_prefixed_str(r)?,
        enabled: read_bool(r)?,
        degraded: read_bool(r)?,
        last_value: read_opt_f64(r)?,
        fire_count: read_u64_le(r)?,
        last_fired: read_opt_f64(r)?,
    })
}

fn encode_state(w: &mut dyn Write, st: &StateRecord) -> Result<(), SnapshotError> {
    write_length_prefixed_str(w, &st.name)?;
    write_f64_slice(w, &st.values)?;
    write_f64_slice(w, &st.derivs)?;
    Ok(())
}

fn decode_state(r: &mut dyn Read) -> Result<StateRecord, SnapshotError> {
    let name = read_length_prefixed_str(r)?;
    let values = read_f64_vec(r)?;
    let derivs = read_f64_vec(r)?;
    if values.len() != derivs.len() {
        return Err(SnapshotError::Malformed {
            detail: format!(
                "state '{name}' has {} values but {} derivatives",
                values.len(),
                derivs.len()
            ),
        });
    }
    Ok(StateRecord {
        name,
        values,
        derivs,
    })
}

fn decode_records<T>(
    r: &mut dyn Read,
    decode: fn(&mut dyn Read) -> Result<T, SnapshotError>,
) -> Result<Vec<T>, SnapshotError> {
    let count = read_count(r)?;
    let mut out = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        out.push(decode(r)?);
    }
    Ok(out)
}

// ── Image encode/decode ─────────────────────────────────────────

fn encode_into(w: &mut dyn Write, image: &SnapshotImage) -> Result<(), SnapshotError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)?;
    write_u64_le(w, image.fingerprint)?;

    write_u8(w, image.mode)?;
    write_u64_le(w, image.frame)?;
    write_i64_le(w, image.time_tics)?;
    write_f64_le(w, image.realtime_ratio)?;
    write_u64_le(w, image.pending_steps)?;

    write_u32_le(w, image.jobs.len() as u32)?;
    for job in &image.jobs {
        encode_job(w, job)?;
    }
    write_u32_le(w, image.loops.len() as u32)?;
    for lp in &image.loops {
        encode_loop(w, lp)?;
    }
    write_u32_le(w, image.events.len() as u32)?;
    for ev in &image.events {
        encode_event(w, ev)?;
    }
    write_u32_le(w, image.states.len() as u32)?;
    for st in &image.states {
        encode_state(w, st)?;
    }
    Ok(())
}

/// Encode an image into a blob with a trailing checksum.
pub fn encode_image(image: &SnapshotImage) -> Result<Blob, SnapshotError> {
    let mut buf = Vec::new();
    encode_into(&mut buf, image)?;
    let sum = checksum(&buf);
    buf.extend_from_slice(&sum.to_le_bytes());
    Ok(Blob(buf))
}

/// Decode and verify a blob.
///
/// Checks, in order: magic, version, length, checksum. Only then is the
/// body parsed. Bytes left over after the last record are an error.
pub fn decode_image(bytes: &[u8]) -> Result<SnapshotImage, SnapshotError> {
    if bytes.len() < MAGIC.len() {
        return Err(SnapshotError::Truncated);
    }
    if bytes[..MAGIC.len()] != MAGIC {
        return Err(SnapshotError::InvalidMagic);
    }
    if bytes.len() < MAGIC.len() + 1 {
        return Err(SnapshotError::Truncated);
    }
    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion { found: version });
    }
    if bytes.len() < PREAMBLE_LEN + CHECKSUM_LEN {
        return Err(SnapshotError::Truncated);
    }

    let (content, tail) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let mut stored = [0u8; CHECKSUM_LEN];
    stored.copy_from_slice(tail);
    let stored = u64::from_le_bytes(stored);
    let computed = checksum(content);
    if stored != computed {
        return Err(SnapshotError::ChecksumMismatch { stored, computed });
    }

    let mut r: &[u8] = &content[MAGIC.len() + 1..];
    let r: &mut dyn Read = &mut r;
    let fingerprint = read_u64_le(r)?;
    let mode = read_u8(r)?;
    let frame = read_u64_le(r)?;
    let time_tics = read_i64_le(r)?;
    let realtime_ratio = read_f64_le(r)?;
    let pending_steps = read_u64_le(r)?;
    let jobs = decode_records(r, decode_job)?;
    let loops = decode_records(r, decode_loop)?;
    let events = decode_records(r, decode_event)?;
    let states = decode_records(r, decode_state)?;

    let mut rest = Vec::new();
    r.read_to_end(&mut rest)?;
    if !rest.is_empty() {
        return Err(SnapshotError::Malformed {
            detail: format!("{} trailing bytes after last record", rest.len()),
        });
    }

    Ok(SnapshotImage {
        fingerprint,
        mode,
        frame,
        time_tics,
        realtime_ratio,
        pending_steps,
        jobs,
        loops,
        events,
        states,
    })
}
