use std::time::Duration;

/// Limits and timings of the collab system
#[derive(Debug, Clone)]
pub struct Config {
    /// A user can not join a waitlist that is longer than this
    pub waitlist_limit: usize,
    /// How many communities a single user may host
    pub max_hosted_communities: usize,
    /// How long a disconnected user keeps its place before it is destroyed
    pub reconnect_grace: Duration,
    /// How often the server pings a connection
    pub ping_interval: Duration,
    /// How long a connection may go without a pong
    pub read_deadline: Duration,
    /// How long writing a single frame may take
    pub write_deadline: Duration,
    /// The largest inbound frame accepted, in bytes
    pub max_frame_size: usize,
    /// How long a read through the repository cache stays fresh
    pub cache_ttl: Duration,
    /// How many entries history and staff listings return
    pub page_size: usize,
    /// Chat messages are truncated to this many bytes
    pub chat_max_length: usize,
}

impl Config {
    /// Returns the number of whole seconds in a media length as a [Duration]
    pub fn media_duration(length_in_seconds: u32) -> Duration {
        Duration::from_secs(length_in_seconds as u64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            waitlist_limit: 30,
            max_hosted_communities: 3,
            reconnect_grace: Duration::from_secs(30),
            ping_interval: Duration::from_secs(10),
            read_deadline: Duration::from_secs(55),
            write_deadline: Duration::from_secs(55),
            max_frame_size: 4096,
            // Media counters change often, so cached reads shouldn't live long
            cache_ttl: Duration::from_secs(60),
            page_size: 50,
            chat_max_length: 300,
        }
    }
}
