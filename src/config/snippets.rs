/// Top-level configuration stanza.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigSnippet {
    /// Agent configuration.
    #[serde(rename = "Main")]
    pub(crate) main: Option<MainSnippet>,
    /// Broker client configuration.
    #[serde(rename = "RabbitMQ")]
    pub(crate) broker: Option<BrokerSnippet>,
}

/// General agent configuration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct MainSnippet {
    /// Minutes between two collection cycles.
    pub(crate) time_period: Option<i64>,
    /// Hostname to report (default: OS hostname).
    pub(crate) hostname: Option<String>,
    /// Behavior when a cycle is due while another one is running (default: skip).
    pub(crate) overlap: Option<String>,
    /// Tick cadence while running, in milliseconds.
    pub(crate) active_tick_ms: Option<u64>,
    /// Tick cadence while paused, in milliseconds.
    pub(crate) idle_tick_ms: Option<u64>,
}

/// Config snippet for the broker client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BrokerSnippet {
    pub(crate) host: Option<String>,
    pub(crate) port: Option<i64>,
    pub(crate) vhost: Option<String>,
    pub(crate) queue: Option<String>,
    pub(crate) user: Option<String>,
    pub(crate) pass: Option<String>,
    /// Exchange to publish to (default: 'win_kb_info').
    pub(crate) exchange: Option<String>,
}
