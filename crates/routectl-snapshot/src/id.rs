//! Snapshot id generation (spec §3): `YYYYMMDD-HHMMSS-mmm-RRRR`.
//!
//! IDs sort lexicographically by creation time in the common case, but a
//! backwards clock jump can produce an id that sorts before existing ones —
//! the random suffix only guards uniqueness, not ordering. `list()` must
//! therefore sort by the metadata timestamp, never by id string (spec §9).

use chrono::Utc;

pub fn generate_id() -> String {
    let now = Utc::now();
    let suffix: u16 = rand::random();
    format!("{}-{:04x}", now.format("%Y%m%d-%H%M%S-%3f"), suffix)
}
