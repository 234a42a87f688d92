//! Hard limits. Everything a client can grow is bounded here.

use crate::model::Ms;

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_SERVICES_PER_TENANT: usize = 10_000;
pub const MAX_RESOURCES_PER_TENANT: usize = 10_000;
pub const MAX_RESERVATIONS_PER_SERVICE: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 2048;
pub const MAX_CONTACT_LEN: usize = 320;

pub const MAX_PARTY_SIZE: u32 = 1000;
pub const MAX_STAY_NIGHTS: i64 = 366;

pub const MIN_SLOT_MINUTES: u32 = 5;
pub const MAX_SLOT_MINUTES: u32 = 24 * 60;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
