//! Trailing command-line targets
//!
//! Turns positional arguments into [`WorkItem`]s. A token starting with
//! [`OPTION_MARKER`] is a sub-option of the nearest reference to its left;
//! the first positional is always a reference.

use std::ffi::OsString;

/// Prefix identifying a per-target sub-option
pub const OPTION_MARKER: char = ':';

/// Where a work item lands in the playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Head of the playlist, playback state untouched
    Insert,
    /// Appended and started immediately
    PlayNow,
    /// Appended after the existing items
    Enqueue,
}

impl InsertMode {
    /// Mode for items handed over by another process
    pub fn for_handoff(play: bool) -> Self {
        if play {
            InsertMode::PlayNow
        } else {
            InsertMode::Enqueue
        }
    }
}

/// One media reference plus its sub-options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub reference: String,
    pub options: Vec<String>,
    pub mode: InsertMode,
}

impl WorkItem {
    pub fn new(reference: impl Into<String>, mode: InsertMode) -> Self {
        Self {
            reference: reference.into(),
            options: Vec::new(),
            mode,
        }
    }
}

/// Work items requested on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTargets {
    /// Positional targets in left-to-right argument order
    positional: Vec<WorkItem>,
    /// Value of `--open`
    open: Option<WorkItem>,
}

impl PendingTargets {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.open.is_none()
    }

    pub fn len(&self) -> usize {
        self.positional.len() + usize::from(self.open.is_some())
    }

    /// Order in which items are submitted to the local playlist
    ///
    /// Positional items go right to left, each inserted at the head, so the
    /// playlist ends up in argument order. `--open` comes last.
    pub fn submission_order(&self) -> impl Iterator<Item = &WorkItem> {
        self.positional.iter().rev().chain(self.open.iter())
    }

    /// Order in which items are sent to a running primary instance
    pub fn handoff_order(&self) -> impl Iterator<Item = &WorkItem> {
        self.positional.iter().chain(self.open.iter())
    }
}

/// Parse positional arguments and the `--open` value
pub fn parse_targets(args: &[OsString], open: Option<&str>) -> PendingTargets {
    let mut positional: Vec<WorkItem> = Vec::new();

    for arg in args {
        // References are normalized to UTF-8; undecodable bytes become U+FFFD
        let token = arg.to_string_lossy().into_owned();

        match positional.last_mut() {
            Some(item) if token.starts_with(OPTION_MARKER) => item.options.push(token),
            _ => positional.push(WorkItem::new(token, InsertMode::Insert)),
        }
    }

    let open = open
        .filter(|s| !s.is_empty())
        .map(|s| WorkItem::new(s, InsertMode::Insert));

    PendingTargets { positional, open }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_options_attach_to_preceding_reference() {
        let pending = parse_targets(&args(&["movie.avi", ":sub1", ":sub2", "other.mp4"]), None);
        let items: Vec<_> = pending.submission_order().collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].reference, "other.mp4");
        assert!(items[0].options.is_empty());
        assert_eq!(items[1].reference, "movie.avi");
        assert_eq!(items[1].options, vec![":sub1", ":sub2"]);
        assert!(items.iter().all(|i| i.mode == InsertMode::Insert));
    }

    #[test]
    fn test_leading_marker_is_a_reference() {
        let pending = parse_targets(&args(&[":odd", ":opt"]), None);
        let items: Vec<_> = pending.handoff_order().collect();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].reference, ":odd");
        assert_eq!(items[0].options, vec![":opt"]);
    }

    #[test]
    fn test_open_goes_last() {
        let pending = parse_targets(&args(&["a.ogg", "b.ogg"]), Some("c.ogg"));

        let submitted: Vec<_> = pending.submission_order().map(|i| i.reference.as_str()).collect();
        assert_eq!(submitted, vec!["b.ogg", "a.ogg", "c.ogg"]);

        let handed: Vec<_> = pending.handoff_order().map(|i| i.reference.as_str()).collect();
        assert_eq!(handed, vec!["a.ogg", "b.ogg", "c.ogg"]);
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn test_empty_open_ignored() {
        let pending = parse_targets(&[], Some(""));
        assert!(pending.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_utf8_normalized() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(vec![b'f', 0xff, b'.', b'o', b'g', b'g']);
        let pending = parse_targets(&[raw], None);
        let item = pending.handoff_order().next().unwrap();
        assert_eq!(item.reference, "f\u{FFFD}.ogg");
    }
}
