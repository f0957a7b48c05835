/// Connection parameters for one engine instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// HTTP origin of the backend, e.g. `http://127.0.0.1:8000`
    pub base_url: String,
    /// Full WebSocket URL of the push channel
    pub push_url: String,
    /// Directory the filesystem session opens first
    pub files_root: String,
    pub files_page_size: u32,
}

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PUSH_PATH: &str = "/ws";
pub const DEFAULT_FILES_ROOT: &str = "/sdcard";
pub const DEFAULT_FILES_PAGE_SIZE: u32 = 100;

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_PUSH_PATH)
    }
}

impl EngineConfig {
    pub fn new(base_url: &str, push_path: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let push_url = push_url_for(&base_url, push_path);
        Self {
            base_url,
            push_url,
            files_root: DEFAULT_FILES_ROOT.to_string(),
            files_page_size: DEFAULT_FILES_PAGE_SIZE,
        }
    }

    pub fn with_files(mut self, root: &str, page_size: u32) -> Self {
        self.files_root = root.to_string();
        self.files_page_size = page_size.max(1);
        self
    }
}

/// Derive the push URL from the HTTP origin: `http` becomes `ws`, `https`
/// becomes `wss`.
pub fn push_url_for(base_url: &str, push_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    if push_path.starts_with('/') {
        format!("{}{}", ws_base, push_path)
    } else {
        format!("{}/{}", ws_base, push_path)
    }
}
