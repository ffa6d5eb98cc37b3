//! Redirect sink shared by the route guard and the request wrapper.

use parking_lot::Mutex;
use tracing::info;

pub const LOGIN_ROUTE: &str = "/login";
pub const UNAUTHORIZED_ROUTE: &str = "/unauthorized";

pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Keeps every redirect in order; the CLI prints from it and tests assert on it.
#[derive(Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self { Self::default() }
    pub fn history(&self) -> Vec<String> { self.history.lock().clone() }
    pub fn last(&self) -> Option<String> { self.history.lock().last().cloned() }
    pub fn count(&self, path: &str) -> usize { self.history.lock().iter().filter(|p| p.as_str() == path).count() }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        info!(target: "navigation", to = path, "redirect");
        self.history.lock().push(path.to_string());
    }
}
