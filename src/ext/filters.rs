//! Composable message filters
//!
//! A [`Filter`] is a named predicate over a [`Message`]. Filters combine with
//! `&`, `|` and `!` (or [`Filter::and`], [`Filter::or`], [`Filter::not`]).

use std::collections::HashSet;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use regex::Regex;

use crate::types::{Message, Update};
use crate::utils::errors::{CastpodError, Result};

type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct Filter {
    name: String,
    predicate: Predicate,
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filter({})", self.name)
    }
}

impl Filter {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, message: &Message) -> bool {
        (self.predicate)(message)
    }

    /// Checks the effective message of `update`, false without one
    pub fn check_update(&self, update: &Update) -> bool {
        update.effective_message().is_some_and(|message| self.check(message))
    }

    pub fn and(self, other: Filter) -> Filter {
        let name = format!("({} & {})", self.name, other.name);
        Filter::new(name, move |m| self.check(m) && other.check(m))
    }

    pub fn or(self, other: Filter) -> Filter {
        let name = format!("({} | {})", self.name, other.name);
        Filter::new(name, move |m| self.check(m) || other.check(m))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        let name = format!("!{}", self.name);
        Filter::new(name, move |m| !self.check(m))
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.or(rhs)
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::not(self)
    }
}

/// Matches every message
pub fn all() -> Filter {
    Filter::new("all", |_| true)
}

/// Messages with text, commands included
pub fn text() -> Filter {
    Filter::new("text", |m| m.text.is_some())
}

/// Messages whose text starts with a command
pub fn command() -> Filter {
    Filter::new("command", |m| m.parse_command().is_some())
}

pub fn caption() -> Filter {
    Filter::new("caption", |m| m.caption.is_some())
}

pub fn private() -> Filter {
    Filter::new("private", |m| m.chat.is_private())
}

/// Groups and supergroups
pub fn group() -> Filter {
    Filter::new("group", |m| m.chat.is_group())
}

pub fn channel() -> Filter {
    Filter::new("channel", |m| m.chat.is_channel())
}

/// Messages carrying any attachment
pub fn attachment() -> Filter {
    Filter::new("attachment", |m| m.effective_attachment().is_some())
}

pub fn audio() -> Filter {
    Filter::new("audio", |m| m.audio.is_some())
}

pub fn document() -> Filter {
    Filter::new("document", |m| m.document.is_some())
}

pub fn reply() -> Filter {
    Filter::new("reply", |m| m.reply_to_message.is_some())
}

/// Text or caption matching `pattern` anywhere
pub fn regex(pattern: &str) -> Result<Filter> {
    let re = Regex::new(pattern)
        .map_err(|e| CastpodError::InvalidInput(format!("Invalid regex {}: {}", pattern, e)))?;
    Ok(Filter::new(format!("regex({})", pattern), move |m| {
        m.text_or_caption().is_some_and(|text| re.is_match(text))
    }))
}

/// Messages sent by one of `ids`
pub fn user_ids(ids: impl IntoIterator<Item = i64>) -> Filter {
    let ids: HashSet<i64> = ids.into_iter().collect();
    Filter::new("user_ids", move |m| {
        m.from.as_ref().is_some_and(|user| ids.contains(&user.id))
    })
}

/// Messages sent in one of `ids`
pub fn chat_ids(ids: impl IntoIterator<Item = i64>) -> Filter {
    let ids: HashSet<i64> = ids.into_iter().collect();
    Filter::new("chat_ids", move |m| ids.contains(&m.chat.id))
}
