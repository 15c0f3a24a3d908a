// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8999;
pub const DEFAULT_MAX_CONNECTIONS: usize = 3000;

// Worker pool configuration constants
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
pub const DEFAULT_MAX_WORKER_TASKS: usize = 1024;

// Transport configuration constants
pub const DEFAULT_MAX_PACKET_SIZE: usize = 4096;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 1024;
/// Frames the connect hook queues before the write loop starts
pub const MIN_OUTBOUND_QUEUE: usize = 4;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1000;

/// Wire header: 4-byte tag followed by 4-byte payload length
pub const HEADER_LEN: usize = 8;

// AOI world extent and grid resolution
pub const DEFAULT_AOI_MIN_X: f32 = 85.0;
pub const DEFAULT_AOI_MAX_X: f32 = 410.0;
pub const DEFAULT_AOI_CNTS_X: usize = 10;
pub const DEFAULT_AOI_MIN_Z: f32 = 75.0;
pub const DEFAULT_AOI_MAX_Z: f32 = 400.0;
pub const DEFAULT_AOI_CNTS_Z: usize = 20;

// Module persistence
pub const DEFAULT_SAVE_PATH: &str = "./save";

/// Connection property holding the bound actor id
pub const PID_PROPERTY: &str = "pid";

// Spawn area for new actors: x in [base, base + spread), same for z
pub const SPAWN_BASE_X: f32 = 160.0;
pub const SPAWN_SPREAD_X: f32 = 10.0;
pub const SPAWN_BASE_Z: f32 = 140.0;
pub const SPAWN_SPREAD_Z: f32 = 20.0;
