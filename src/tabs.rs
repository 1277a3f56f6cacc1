//! Tab router.
//!
//! New module: fans each incoming line into one or more named sinks by
//! filter, in COPY or MOVE mode. The bounded content ring reuses the capped
//! `VecDeque` idiom from `history.rs`'s `InputHistory` (push, then truncate
//! to `max_size`), adapted to push at the back -- oldest evicted first,
//! newest last -- matching a "last N lines" framing rather than
//! history's "newest first" recall framing.

use std::collections::VecDeque;

use crate::ansi::Styled;
use crate::pattern::Pattern;

pub type TabId = String;

pub const MAIN_TAB: &str = "main";
pub const LOGS_TAB: &str = "logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Copy,
    Move,
}

/// One ordered filter rule within a tab.
#[derive(Debug, Clone)]
pub struct TabFilter {
    pub pattern: Pattern,
    pub replacement: Option<String>,
    pub match_on_colored_text: bool,
}

/// A named output stream with its own bounded history.
#[derive(Debug)]
pub struct Tab {
    pub id: TabId,
    pub filters: Vec<TabFilter>,
    pub capture_mode: CaptureMode,
    pub max_lines: usize,
    content: VecDeque<Styled>,
    pub unread: bool,
}

impl Tab {
    pub fn new(id: impl Into<String>, max_lines: usize) -> Self {
        Self {
            id: id.into(),
            filters: Vec::new(),
            capture_mode: CaptureMode::Copy,
            max_lines: max_lines.max(1),
            content: VecDeque::new(),
            unread: false,
        }
    }

    pub fn content(&self) -> &VecDeque<Styled> {
        &self.content
    }

    /// Append `line`, coalescing consecutive blank lines to at most one, and
    /// evicting the oldest entry once `max_lines` is exceeded.
    fn push(&mut self, line: Styled) {
        let is_blank = line.clean.trim().is_empty();
        if is_blank {
            if let Some(last) = self.content.back() {
                if last.clean.trim().is_empty() {
                    return;
                }
            }
        }
        self.content.push_back(line);
        while self.content.len() > self.max_lines {
            self.content.pop_front();
        }
    }
}

/// The result of routing one line through the tab set.
#[derive(Debug, Default)]
pub struct RouteOutcome {
    /// `true` if the line should still be appended to the main observable
    /// buffer (no MOVE filter claimed it).
    pub deliver_to_main: bool,
    /// Tab ids that received this line (for marking unread / notifying observers).
    pub delivered_tabs: Vec<TabId>,
}

/// Owns every tab, including the permanent `main`/`logs` system tabs.
#[derive(Debug)]
pub struct TabRouter {
    tabs: Vec<Tab>,
    active: TabId,
}

impl Default for TabRouter {
    fn default() -> Self {
        Self::new(2000)
    }
}

impl TabRouter {
    pub fn new(system_tab_capacity: usize) -> Self {
        Self {
            tabs: vec![
                Tab::new(MAIN_TAB, system_tab_capacity),
                Tab::new(LOGS_TAB, system_tab_capacity),
            ],
            active: MAIN_TAB.to_string(),
        }
    }

    /// Add a user tab. Fails silently (no-op) if the id collides with a
    /// system tab or an existing tab.
    pub fn add_tab(&mut self, tab: Tab) -> bool {
        if tab.id == MAIN_TAB || tab.id == LOGS_TAB || self.tabs.iter().any(|t| t.id == tab.id) {
            return false;
        }
        self.tabs.push(tab);
        true
    }

    /// Remove a user tab. System tabs cannot be removed.
    pub fn remove_tab(&mut self, id: &str) -> bool {
        if id == MAIN_TAB || id == LOGS_TAB {
            return false;
        }
        let before = self.tabs.len();
        self.tabs.retain(|t| t.id != id);
        self.tabs.len() != before
    }

    pub fn tab(&self, id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    /// All tabs, system tabs included, in declaration order. Used by the
    /// status hub to publish a per-tab content snapshot.
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn set_active(&mut self, id: &str) {
        if let Some(t) = self.tabs.iter_mut().find(|t| t.id == id) {
            t.unread = false;
            self.active = id.to_string();
        }
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    /// Route one line: evaluate each user tab's filters in declaration
    /// order; the first match in the first matching tab claims the line
    /// (COPY also forwards to main, MOVE withholds it from main).
    pub fn route(&mut self, line: &Styled) -> RouteOutcome {
        let mut outcome = RouteOutcome {
            deliver_to_main: true,
            delivered_tabs: Vec::new(),
        };

        let active = self.active.clone();
        let mut claimed: Option<(usize, CaptureMode, Styled)> = None;

        'tabs: for (idx, tab) in self.tabs.iter_mut().enumerate() {
            if tab.id == MAIN_TAB || tab.id == LOGS_TAB {
                continue;
            }
            for filter in &tab.filters {
                let subject = if filter.match_on_colored_text {
                    &line.raw
                } else {
                    &line.clean
                };
                if let Some(caps) = filter.pattern.find(subject) {
                    let delivered = match &filter.replacement {
                        Some(template) => {
                            let replaced = caps.substitute(template);
                            Styled {
                                raw: replaced.clone(),
                                clean: replaced,
                                attr: line.attr,
                            }
                        }
                        None => line.clone(),
                    };
                    claimed = Some((idx, tab.capture_mode, delivered));
                    break 'tabs;
                }
            }
        }

        if let Some((idx, mode, delivered)) = claimed {
            let tab = &mut self.tabs[idx];
            tab.push(delivered);
            if tab.id != active {
                tab.unread = true;
            }
            outcome.delivered_tabs.push(tab.id.clone());
            outcome.deliver_to_main = matches!(mode, CaptureMode::Copy);
        }

        if outcome.deliver_to_main {
            let main = self.tabs.iter_mut().find(|t| t.id == MAIN_TAB).unwrap();
            main.push(line.clone());
        }

        outcome
    }
}
