pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const DATABASE: &str = "🗄️";
    pub const CORAL: &str = "🪸";
    pub const HEALTHY: &str = "🟢";
    pub const BLEACHED: &str = "⚪";
    pub const HOURGLASS: &str = "⏳";
    pub const DEL: &str = "🗑️";
    pub const BRAIN: &str = "🧠";
    pub const IMAGE: &str = "🖼️";
}
