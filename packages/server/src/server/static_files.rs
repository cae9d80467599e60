use std::path::Path;

use tower_http::services::{ServeDir, ServeFile};

/// Serve the static asset directory with SPA fallback.
///
/// Paths that match no file get `index.html` with status 200 so client-side
/// routing works on a full page load.
pub fn spa_service(root: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(root).fallback(ServeFile::new(root.join("index.html")))
}
