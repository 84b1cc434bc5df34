// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Name given to the worker thread (shows up in debuggers and `top -H`).
    pub thread_name: String,
    /// Open the notification pipe right away instead of on first
    /// `notification_handle()`.
    pub notification_channel: bool,
    /// Turn a panicking job into an execution error instead of losing the
    /// worker thread.
    pub catch_panics: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: "threadwrap-worker".to_string(),
            notification_channel: false,
            catch_panics: true,
        }
    }
}

impl DispatcherConfig {
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_notification_channel(mut self, enabled: bool) -> Self {
        self.notification_channel = enabled;
        self
    }

    pub fn with_catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }
}
