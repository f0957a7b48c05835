use crate::api::{CommandResponse, Device, FileEntry, FileListResponse, ReadFileResponse};
use crate::client::busy::BusyFlag;
use crate::client::state::SyncStore;
use crate::client::transport::{SessionApi, UploadFile};
use crate::client::types::SyncError;
use crate::notify::NotificationCenter;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Path helpers ────────────────────────────────────────────────────────────

/// Join a directory and an entry name with exactly one `/` between them.
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() || base == "/" {
        return format!("/{}", name);
    }
    format!("{}/{}", base.trim_end_matches('/'), name)
}

/// Parent directory of `path`; the root is its own parent.
pub fn parent_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() <= 1 {
        return "/".to_string();
    }
    format!("/{}", parts[..parts.len() - 1].join("/"))
}

/// Last path component, or the path itself when it has none.
pub fn basename(path: &str) -> &str {
    path.split('/')
        .filter(|p| !p.is_empty())
        .next_back()
        .unwrap_or(path)
}

fn trim_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Reject moves that cannot succeed: onto itself or into its own subtree.
pub fn validate_move(source: &str, destination: &str) -> Result<(), SyncError> {
    let src = trim_slashes(source.trim());
    let dst = trim_slashes(destination.trim());
    if src.is_empty() || dst.is_empty() {
        return Err(SyncError::InvalidMove(
            "Source and destination are required".to_string(),
        ));
    }
    if src == dst {
        return Err(SyncError::InvalidMove(format!(
            "Cannot move {} onto itself",
            source
        )));
    }
    let prefix = if src == "/" {
        "/".to_string()
    } else {
        format!("{}/", src)
    };
    if dst.starts_with(&prefix) {
        return Err(SyncError::InvalidMove(format!(
            "Cannot move {} into itself",
            source
        )));
    }
    Ok(())
}

/// Pick the device a filesystem call targets: the explicit selection, else
/// the only connected device.
pub fn resolve_serial(selected: Option<&str>, devices: &[Device]) -> Result<String, SyncError> {
    if let Some(serial) = selected.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(serial.to_string());
    }
    match devices {
        [] => Err(SyncError::NoDevice),
        [only] => Ok(only.serial.clone()),
        _ => Err(SyncError::SelectDevice),
    }
}

/// Clamp `page` into `[1, total_pages]`.
pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

/// `ceil(total / page_size)`, never less than one.
pub fn total_pages_for(total_count: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    let pages = total_count.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

// ── Listing ─────────────────────────────────────────────────────────────────

/// The one directory snapshot a session holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileListing {
    /// Device the entries came from
    pub serial: Option<String>,
    pub current_path: String,
    pub entries: Vec<FileEntry>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u32,
    pub loading: bool,
    pub error: Option<String>,
}

impl FileListing {
    fn empty(path: &str, page_size: u32) -> Self {
        Self {
            serial: None,
            current_path: path.to_string(),
            entries: Vec::new(),
            page: 1,
            page_size: page_size.max(1),
            total_count: 0,
            total_pages: 1,
            loading: false,
            error: None,
        }
    }

    fn apply_response(
        &mut self,
        serial: String,
        path: &str,
        page: u32,
        page_size: u32,
        resp: FileListResponse,
    ) {
        let total_count = resp.total_count.unwrap_or(resp.files.len() as u64);
        let page_size = resp.page_size.unwrap_or(page_size).max(1);
        let total_pages = resp
            .total_pages
            .unwrap_or_else(|| total_pages_for(total_count, page_size))
            .max(1);
        self.serial = Some(serial);
        self.current_path = path.to_string();
        self.entries = resp.files;
        self.page = resp.page.unwrap_or(page).max(1);
        self.page_size = page_size;
        self.total_count = total_count;
        self.total_pages = total_pages;
        self.error = None;
    }

    fn clear_with_error(&mut self, message: String) {
        self.entries.clear();
        self.total_count = 0;
        self.total_pages = 1;
        self.page = 1;
        self.error = Some(message);
    }
}

/// Outcome of a multi-file upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadReport {
    pub succeeded: usize,
    pub total: usize,
}

enum Mutation<'a> {
    Mkdir { path: &'a str },
    Delete { path: &'a str },
    Move { source: &'a str, destination: &'a str },
    Write { path: &'a str, content: &'a str },
}

impl Mutation<'_> {
    fn success_message(&self) -> String {
        match self {
            Mutation::Mkdir { path } => format!("Folder created: {}", path),
            Mutation::Delete { path } => format!("Deleted {}", basename(path)),
            Mutation::Move { destination, .. } => format!("Moved to {}", destination),
            Mutation::Write { path, .. } => format!("Saved {}", path),
        }
    }

    fn failure_message(&self) -> String {
        match self {
            Mutation::Mkdir { path } => format!("Create folder failed for {}", path),
            Mutation::Delete { path } => format!("Delete failed for {}", basename(path)),
            Mutation::Move { source, .. } => format!("Move failed for {}", source),
            Mutation::Write { path, .. } => format!("Save failed for {}", path),
        }
    }
}

fn check_success(resp: CommandResponse, fallback: impl FnOnce() -> String) -> Result<(), SyncError> {
    if resp.success {
        Ok(())
    } else {
        Err(SyncError::Rejected(
            resp.error_text()
                .map(str::to_string)
                .unwrap_or_else(fallback),
        ))
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

/// Paginated view of one remote directory plus mutations against it.
///
/// Mutations are serialized by a busy flag; listings are not, so a late
/// response may briefly show a stale directory. After `close()` every late
/// result is discarded.
pub struct FileSession {
    api: Arc<dyn SessionApi>,
    store: SyncStore,
    notifications: NotificationCenter,
    root: String,
    listing: Mutex<FileListing>,
    selected: Mutex<Option<String>>,
    busy: BusyFlag,
    closed: AtomicBool,
}

impl FileSession {
    pub fn new(
        api: Arc<dyn SessionApi>,
        store: SyncStore,
        notifications: NotificationCenter,
        root: &str,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            store,
            notifications,
            root: root.to_string(),
            listing: Mutex::new(FileListing::empty(root, page_size)),
            selected: Mutex::new(None),
            busy: BusyFlag::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn listing(&self) -> FileListing {
        self.listing.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_set()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting results; in-flight calls finish but change nothing.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Set or clear the explicit device. Applies from the next call on.
    pub fn select_device(&self, serial: Option<String>) {
        *self.selected.lock() = serial.filter(|s| !s.trim().is_empty());
    }

    pub fn selected_device(&self) -> Option<String> {
        self.selected.lock().clone()
    }

    fn serial(&self) -> Result<String, SyncError> {
        let selected = self.selected.lock().clone();
        self.store
            .read(|s| resolve_serial(selected.as_deref(), &s.devices))
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.is_closed() {
            Err(SyncError::Closed)
        } else {
            Ok(())
        }
    }

    /// Position to re-list after a mutation: the displayed directory and
    /// page.
    fn current_position(&self) -> (String, u32, u32) {
        let listing = self.listing.lock();
        (
            listing.current_path.clone(),
            listing.page,
            listing.page_size,
        )
    }

    // ── Listing ──────────────────────────────────────────────────────────

    /// Replace the listing with one page of `path`.
    pub async fn list(&self, path: &str, page: u32, page_size: u32) -> Result<(), SyncError> {
        self.ensure_open()?;
        let page = page.max(1);
        let page_size = page_size.max(1);

        let serial = match self.serial() {
            Ok(serial) => serial,
            Err(e) => {
                let message = e.to_string();
                self.listing.lock().clear_with_error(message.clone());
                self.notifications.error(message);
                return Err(e);
            }
        };

        {
            let mut listing = self.listing.lock();
            listing.loading = true;
            listing.error = None;
        }

        let result = self.api.list_files(&serial, path, page, page_size).await;
        if self.is_closed() {
            log::debug!("Discarding listing of {} after close", path);
            return Err(SyncError::Closed);
        }

        let mut listing = self.listing.lock();
        listing.loading = false;
        match result {
            Ok(resp) => {
                listing.apply_response(serial, path, page, page_size, resp);
                log::debug!(
                    "Listed {} page {}/{} ({} entries)",
                    path,
                    listing.page,
                    listing.total_pages,
                    listing.entries.len()
                );
                Ok(())
            }
            Err(e) => {
                let message = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("File list failed for {}", path));
                log::warn!("File list failed for {}: {}", path, e);
                listing.clear_with_error(message.clone());
                drop(listing);
                self.notifications.error(message);
                Err(e)
            }
        }
    }

    /// First page of the configured root directory.
    pub async fn open_root(&self) -> Result<(), SyncError> {
        let page_size = self.listing.lock().page_size;
        let root = self.root.clone();
        self.list(&root, 1, page_size).await
    }

    pub async fn navigate(&self, path: &str) -> Result<(), SyncError> {
        let page_size = self.listing.lock().page_size;
        self.list(path, 1, page_size).await
    }

    pub async fn navigate_up(&self) -> Result<(), SyncError> {
        let parent = parent_path(&self.listing.lock().current_path);
        self.navigate(&parent).await
    }

    pub async fn refresh(&self) -> Result<(), SyncError> {
        let (path, page, page_size) = self.current_position();
        self.list(&path, page, page_size).await
    }

    pub async fn change_page(&self, page: u32) -> Result<(), SyncError> {
        let (path, page, page_size) = {
            let listing = self.listing.lock();
            (
                listing.current_path.clone(),
                clamp_page(page, listing.total_pages),
                listing.page_size,
            )
        };
        self.list(&path, page, page_size).await
    }

    pub async fn change_page_size(&self, page_size: u32) -> Result<(), SyncError> {
        let path = {
            let mut listing = self.listing.lock();
            listing.page_size = page_size.max(1);
            listing.current_path.clone()
        };
        self.list(&path, 1, page_size).await
    }

    /// Fetch a file's content. Not serialized with mutations.
    pub async fn read(&self, path: &str) -> Result<ReadFileResponse, SyncError> {
        self.ensure_open()?;
        let serial = self.serial()?;
        self.api.read_file(&serial, path).await
    }

    // ── Mutations ────────────────────────────────────────────────────────

    async fn dispatch(&self, serial: &str, op: &Mutation<'_>) -> Result<CommandResponse, SyncError> {
        match op {
            Mutation::Mkdir { path } => self.api.mkdir(serial, path).await,
            Mutation::Delete { path } => self.api.delete(serial, path).await,
            Mutation::Move {
                source,
                destination,
            } => self.api.move_entry(serial, source, destination).await,
            Mutation::Write { path, content } => self.api.write_file(serial, path, content).await,
        }
    }

    fn surface_precondition(&self, e: SyncError) -> SyncError {
        if !matches!(e, SyncError::Busy | SyncError::Closed) {
            self.notifications.error(e.to_string());
        }
        e
    }

    /// Busy flag, remote call, re-list on success, error on failure. The
    /// listing is untouched unless the call succeeded.
    async fn mutate(&self, op: Mutation<'_>) -> Result<(), SyncError> {
        self.ensure_open()?;
        let _busy = self.busy.acquire()?;
        let serial = self.serial().map_err(|e| self.surface_precondition(e))?;

        let outcome = match self.dispatch(&serial, &op).await {
            Ok(resp) => check_success(resp, || op.failure_message()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                if self.is_closed() {
                    return Ok(());
                }
                self.notifications.success(op.success_message());
                let (path, page, page_size) = self.current_position();
                let _ = self.list(&path, page, page_size).await;
                Ok(())
            }
            Err(e) => {
                log::warn!("{}: {}", op.failure_message(), e);
                if !self.is_closed() {
                    self.notifications.error(
                        e.server_message()
                            .map(str::to_string)
                            .unwrap_or_else(|| op.failure_message()),
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), SyncError> {
        self.mutate(Mutation::Mkdir { path }).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), SyncError> {
        self.mutate(Mutation::Delete { path }).await
    }

    pub async fn move_entry(&self, source: &str, destination: &str) -> Result<(), SyncError> {
        validate_move(source, destination).map_err(|e| self.surface_precondition(e))?;
        self.mutate(Mutation::Move {
            source,
            destination,
        })
        .await
    }

    pub async fn write(&self, path: &str, content: &str) -> Result<(), SyncError> {
        self.mutate(Mutation::Write { path, content }).await
    }

    /// Create `name` inside the displayed directory. A blank name is a no-op.
    pub async fn create_folder(&self, name: &str) -> Result<(), SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        let path = join_path(&self.listing.lock().current_path, name);
        self.mkdir(&path).await
    }

    /// Rename in place. A blank or unchanged name is a no-op.
    pub async fn rename(&self, path: &str, new_name: &str) -> Result<(), SyncError> {
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == basename(path) {
            return Ok(());
        }
        let destination = join_path(&parent_path(path), new_name);
        self.move_entry(path, &destination).await
    }

    /// Drag-and-drop of `source` onto the directory `target_dir`. Dropping
    /// an entry onto itself or back into its own parent does nothing.
    pub async fn drop_on(&self, source: &str, target_dir: &str) -> Result<(), SyncError> {
        if source.is_empty() || source == target_dir {
            return Ok(());
        }
        let destination = join_path(target_dir, basename(source));
        if destination == source {
            return Ok(());
        }
        self.move_entry(source, &destination).await
    }

    /// Upload each file with its own request. Per-file failures are reported
    /// individually; the destination is re-listed when at least one file
    /// made it.
    pub async fn upload(
        &self,
        files: Vec<UploadFile>,
        destination: &str,
    ) -> Result<UploadReport, SyncError> {
        let total = files.len();
        if total == 0 {
            return Ok(UploadReport {
                succeeded: 0,
                total: 0,
            });
        }
        self.ensure_open()?;
        let _busy = self.busy.acquire()?;
        let serial = self.serial().map_err(|e| self.surface_precondition(e))?;

        let mut succeeded = 0;
        for file in files {
            let name = file.name.clone();
            let outcome = match self.api.upload(&serial, destination, file).await {
                Ok(resp) => check_success(resp, || format!("Upload failed for {}", name)),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    log::warn!("Upload of {} to {} failed: {}", name, destination, e);
                    if !self.is_closed() {
                        self.notifications
                            .error(format!("Upload failed for {}", name));
                    }
                }
            }
        }

        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        if succeeded == 0 {
            return Err(SyncError::Rejected("Upload failed".to_string()));
        }

        self.notifications
            .success(format!("Uploaded {} of {} files", succeeded, total));
        let (current, page, page_size) = self.current_position();
        let page = if destination == current { page } else { 1 };
        let _ = self.list(destination, page, page_size).await;
        Ok(UploadReport { succeeded, total })
    }
}
