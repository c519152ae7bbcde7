//! Chat message model
//!
//! A `Message` is an immutable value broadcast by the server: an arrival
//! timestamp, a content string and an optional author. Messages without an
//! author are control messages emitted by the server itself.
//!
//! Messages carry no intrinsic order. Callers that need one build an
//! [`OrderCriteria`] and pass it explicitly to [`Message::compare_with`] or
//! [`OrderCriteria::sort`].

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{GRANTED, KICK, LOGGED_OUT};

/// Format used when rendering message timestamps
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(content: impl Into<String>, author: Option<String>) -> Self {
        Self::at(None, content, author)
    }

    /// Create a message with an explicit timestamp (`None` means now)
    pub fn at(
        timestamp: Option<DateTime<Utc>>,
        content: impl Into<String>,
        author: Option<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.unwrap_or_else(Utc::now),
            content: content.into(),
            author,
        }
    }

    /// Create a user message
    pub fn authored(content: impl Into<String>, author: impl Into<String>) -> Self {
        Self::new(content, Some(author.into()))
    }

    /// Create a control message (no author)
    pub fn control(content: impl Into<String>) -> Self {
        Self::new(content, None)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn has_author(&self) -> bool {
        self.author.is_some()
    }

    /// Control messages are the ones emitted by the server itself
    pub fn is_control(&self) -> bool {
        self.author.is_none()
    }

    /// Timestamp rendered in local time with [`DATE_FORMAT`]
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format(DATE_FORMAT)
            .to_string()
    }

    /// Name of the user this control message announces as gone, if any
    ///
    /// Recognises `"<name> logged out"` and
    /// `"kick <name> [request granted by server] by <requester>"`.
    pub fn departed_user(&self) -> Option<&str> {
        if !self.is_control() {
            return None;
        }

        if let Some(name) = self
            .content
            .strip_suffix(LOGGED_OUT)
            .and_then(|rest| rest.strip_suffix(' '))
        {
            return (!name.is_empty()).then_some(name);
        }

        let rest = self.content.strip_prefix(KICK)?.strip_prefix(' ')?;
        let (name, _) = rest.split_once(GRANTED)?;
        let name = name.trim();
        (!name.is_empty()).then_some(name)
    }

    /// Three-way comparison following the given criteria
    ///
    /// An empty criteria set compares by timestamp only. Otherwise each
    /// criterion is tried in insertion order and the first non-equal
    /// result wins.
    pub fn compare_with(&self, other: &Message, criteria: &OrderCriteria) -> Ordering {
        if criteria.is_empty() {
            return self.timestamp.cmp(&other.timestamp);
        }

        criteria
            .iter()
            .map(|criterion| criterion.compare(self, other))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Rendered as `[yyyy/MM/dd HH:mm:ss] author > content`
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.formatted_timestamp())?;
        if let Some(author) = &self.author {
            write!(f, "{} > ", author)?;
        }
        f.write_str(&self.content)
    }
}

/// A single sort criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageOrder {
    /// Alphabetical by author; authorless messages sort first
    Author,
    /// Chronological
    Date,
    /// Alphabetical by content
    Content,
}

impl MessageOrder {
    fn compare(self, a: &Message, b: &Message) -> Ordering {
        match self {
            // Option orders None below Some, which is the rule we want
            MessageOrder::Author => a.author.cmp(&b.author),
            MessageOrder::Date => a.timestamp.cmp(&b.timestamp),
            MessageOrder::Content => a.content.cmp(&b.content),
        }
    }
}

impl fmt::Display for MessageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageOrder::Author => "Author",
            MessageOrder::Date => "Date",
            MessageOrder::Content => "Content",
        };
        f.write_str(name)
    }
}

/// Ordered set of sort criteria
///
/// Each criterion appears at most once; insertion order is the priority
/// order used by [`Message::compare_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderCriteria {
    orders: Vec<MessageOrder>,
}

impl OrderCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a criterion at the lowest priority
    ///
    /// Returns false if it was already present (the set is unchanged).
    pub fn add(&mut self, order: MessageOrder) -> bool {
        if self.orders.contains(&order) {
            return false;
        }
        self.orders.push(order);
        true
    }

    /// Builder form of [`add`](Self::add)
    pub fn with(mut self, order: MessageOrder) -> Self {
        self.add(order);
        self
    }

    /// Returns true if the criterion was present and has been removed
    pub fn remove(&mut self, order: MessageOrder) -> bool {
        let before = self.orders.len();
        self.orders.retain(|o| *o != order);
        self.orders.len() != before
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = MessageOrder> + '_ {
        self.orders.iter().copied()
    }

    pub fn compare(&self, a: &Message, b: &Message) -> Ordering {
        a.compare_with(b, self)
    }

    /// Stable sort of `messages` following these criteria
    pub fn sort(&self, messages: &mut [Message]) {
        messages.sort_by(|a, b| self.compare(a, b));
    }
}

/// Rendered as `{Author, Date}`
impl fmt::Display for OrderCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, order) in self.orders.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", order)?;
        }
        f.write_str("}")
    }
}
