//! Protocol and session defaults.

// Broker defaults
pub const DEFAULT_MQTT_HOST: &str = "iot.eclipse.org";
pub const MQTT_DEFAULT_PORT: u16 = 1883;
pub const MQTT_SECURE_PORT: u16 = 8883;

// Session defaults
pub const DEFAULT_CMD_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_CON_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MQTT_QOS: u8 = 2;
pub const DEFAULT_KEEP_ALIVE_SEC: u16 = 60;
pub const DEFAULT_CLIENT_ID: &str = "FwPushClient";

// Topics
pub const FIRMWARE_TOPIC_NAME: &str = "fwpush/example/firmware";
pub const DEFAULT_LWT_TOPIC: &str = "lwttopic";

// Client limits
/// Largest packet accepted from the broker.
pub const MAX_INCOMING_PACKET: usize = 64 * 1024;
/// Largest packet the client will send (the MQTT remaining-length maximum).
pub const MAX_OUTGOING_PACKET: usize = 268_435_455;
/// Requests queued between the client handle and its connection.
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

// Status codes reported for each session step.
pub const MQTT_CODE_SUCCESS: i32 = 0;
pub const MQTT_CODE_ERROR_BAD_ARG: i32 = -1;
pub const MQTT_CODE_ERROR_MALFORMED_DATA: i32 = -3;
pub const MQTT_CODE_ERROR_TLS_CONNECT: i32 = -6;
pub const MQTT_CODE_ERROR_TIMEOUT: i32 = -7;
pub const MQTT_CODE_ERROR_NETWORK: i32 = -8;
pub const MQTT_CODE_ERROR_NOT_CONNECTED: i32 = -10;
