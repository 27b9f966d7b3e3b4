use crate::config::Dialect;
use crate::error::{Result, TriggerError};
use crate::service::Dimension;

/// One element of a trigger command line, in the order it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestItem {
    Server(String),
    Dimension(Dimension),
    Env { key: String, value: String },
    Tag(String),
    /// Any other token, passed through untouched.
    Flag(String),
}

/// Dialect-neutral trigger request.
///
/// Parsed from either client dialect and serialized back to either one
/// without losing dimensions, flags, or trailing arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerRequest {
    items: Vec<RequestItem>,
    /// Arguments after `--`, handed to the task itself.
    extra_args: Vec<String>,
}

impl TriggerRequest {
    pub fn parse(args: &[String], dialect: Dialect) -> Result<Self> {
        match dialect {
            Dialect::Legacy => Self::parse_legacy(args),
            Dialect::Go => Self::parse_go(args),
        }
    }

    /// Parse `swarming.py` style arguments (`--dimension key value`).
    pub fn parse_legacy(args: &[String]) -> Result<Self> {
        Self::parse_with(args, "--swarming", legacy_dimension)
    }

    /// Parse Go client style arguments (`--dimension key=value`).
    pub fn parse_go(args: &[String]) -> Result<Self> {
        Self::parse_with(args, "--server", |iter| {
            let pair = next_positional(iter)?;
            match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok(Dimension::new(key, value)),
                _ => Err(TriggerError::MalformedArguments(format!(
                    "expected --dimension key=value, got {:?}",
                    pair
                ))),
            }
        })
    }

    fn parse_with<'a, F>(args: &'a [String], server_flag: &str, mut dimension: F) -> Result<Self>
    where
        F: FnMut(&mut std::slice::Iter<'a, String>) -> Result<Dimension>,
    {
        let mut request = Self::default();
        let mut iter = args.iter();
        if args.first().map(String::as_str) == Some("trigger") {
            iter.next();
        }

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--" => {
                    request.extra_args = iter.by_ref().cloned().collect();
                    break;
                }
                "--dimension" => {
                    let dim = dimension(&mut iter)?;
                    request.items.push(RequestItem::Dimension(dim));
                }
                flag if flag == server_flag => {
                    let server = iter.next().ok_or_else(|| {
                        TriggerError::MalformedArguments(format!("{} requires a value", flag))
                    })?;
                    request.items.push(RequestItem::Server(server.clone()));
                }
                _ => request.items.push(RequestItem::Flag(arg.clone())),
            }
        }
        Ok(request)
    }

    pub fn server(&self) -> Option<&str> {
        self.items.iter().find_map(|item| match item {
            RequestItem::Server(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.items
            .iter()
            .filter_map(|item| match item {
                RequestItem::Dimension(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    pub fn add_dimension(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items
            .push(RequestItem::Dimension(Dimension::new(key, value)));
    }

    pub fn add_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.push(RequestItem::Env {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.items.push(RequestItem::Tag(tag.into()));
    }

    /// Copy of this request pinned to one shard and, when known, one bot.
    pub fn scoped_to_shard(
        &self,
        shard_index: usize,
        shard_count: usize,
        bot_id: Option<&str>,
    ) -> Self {
        let mut scoped = self.clone();
        if let Some(bot_id) = bot_id {
            scoped.add_dimension("id", bot_id);
        }
        scoped.add_env("GTEST_SHARD_INDEX", shard_index.to_string());
        scoped.add_env("GTEST_TOTAL_SHARDS", shard_count.to_string());
        scoped.add_tag(crate::fleet::shard_tag(shard_index));
        scoped
    }

    pub fn to_args(&self, dialect: Dialect) -> Vec<String> {
        match dialect {
            Dialect::Legacy => self.to_legacy_args(),
            Dialect::Go => self.to_go_args(),
        }
    }

    pub fn to_legacy_args(&self) -> Vec<String> {
        let mut args = vec!["trigger".to_string()];
        for item in &self.items {
            match item {
                RequestItem::Server(s) => args.extend(["--swarming".to_string(), s.clone()]),
                RequestItem::Dimension(d) => args.extend([
                    "--dimension".to_string(),
                    d.key.clone(),
                    d.value.clone(),
                ]),
                RequestItem::Env { key, value } => {
                    args.extend(["--env".to_string(), key.clone(), value.clone()])
                }
                RequestItem::Tag(t) => args.extend(["--tag".to_string(), t.clone()]),
                RequestItem::Flag(f) => args.push(f.clone()),
            }
        }
        self.push_extra_args(&mut args);
        args
    }

    pub fn to_go_args(&self) -> Vec<String> {
        let mut args = vec!["trigger".to_string()];
        self.push_go_items(&mut args);
        self.push_extra_args(&mut args);
        args
    }

    fn push_go_items(&self, args: &mut Vec<String>) {
        for item in &self.items {
            match item {
                RequestItem::Server(s) => args.extend(["--server".to_string(), s.clone()]),
                RequestItem::Dimension(d) => args.extend([
                    "--dimension".to_string(),
                    format!("{}={}", d.key, d.value),
                ]),
                RequestItem::Env { key, value } => {
                    args.extend(["-env".to_string(), format!("{}={}", key, value)])
                }
                RequestItem::Tag(t) => args.extend(["-tag".to_string(), t.clone()]),
                RequestItem::Flag(f) => args.push(f.clone()),
            }
        }
    }

    fn push_extra_args(&self, args: &mut Vec<String>) {
        if !self.extra_args.is_empty() {
            args.push("--".to_string());
            args.extend(self.extra_args.iter().cloned());
        }
    }
}

/// Rewrite legacy client arguments into the Go client's form.
///
/// Only `--swarming` and `--dimension` change shape; every other token keeps
/// its position. No subcommand is prepended.
pub fn convert_to_go_args(args: &[String]) -> Result<Vec<String>> {
    let request = TriggerRequest::parse_with(args, "--swarming", legacy_dimension)?;
    let mut go_args = Vec::with_capacity(args.len());
    if args.first().map(String::as_str) == Some("trigger") {
        go_args.push("trigger".to_string());
    }
    request.push_go_items(&mut go_args);
    request.push_extra_args(&mut go_args);
    Ok(go_args)
}

fn legacy_dimension(iter: &mut std::slice::Iter<'_, String>) -> Result<Dimension> {
    let key = next_positional(iter)?;
    let value = next_positional(iter)?;
    Ok(Dimension::new(key, value))
}

fn next_positional<'a>(iter: &mut std::slice::Iter<'a, String>) -> Result<&'a String> {
    match iter.next() {
        Some(value) if !value.starts_with("--") => Ok(value),
        Some(value) => Err(TriggerError::MalformedArguments(format!(
            "--dimension expects two values, found flag {:?}",
            value
        ))),
        None => Err(TriggerError::MalformedArguments(
            "--dimension expects two values".to_string(),
        )),
    }
}
