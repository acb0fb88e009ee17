/// Log tags identify the subsystem a message originates from.
///
/// Each tag maps to a `--debug-<module>` command-line flag so diagnostic
/// output can be enabled per subsystem without drowning the console.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Api,
    Collector,
    Cache,
    Backfill,
    Scheduler,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Api => "API",
            LogTag::Collector => "COLLECTOR",
            LogTag::Cache => "CACHE",
            LogTag::Backfill => "BACKFILL",
            LogTag::Scheduler => "SCHEDULER",
        }
    }

    /// The `--debug-<key>` suffix that enables debug output for this tag
    pub fn debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Api => "api",
            LogTag::Collector => "collector",
            LogTag::Cache => "cache",
            LogTag::Backfill => "backfill",
            LogTag::Scheduler => "scheduler",
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
