//! Declarative message and subscription specs
//!
//! Objects describe their bus bindings as data: which local events publish
//! where, and which methods receive what. The string forms accepted here are
//! `"channel topic"` for a [`Route`] and `"topic"` or `"channel topic"` for a
//! [`TopicRef`]. Strings are parsed once, when a spec is built, into the tagged
//! shapes below.

use crate::callback::Accessor;
use crate::error::CourierError;
use crate::Result;
use crate::utils::route_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A concrete channel and topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Route {
    pub channel: String,
    pub topic: String,
}

impl Route {
    pub fn new(channel: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            topic: topic.into(),
        }
    }

    /// The `"channel topic"` key this route is indexed under
    pub fn key(&self) -> String {
        route_key(&self.channel, &self.topic)
    }
}

impl FromStr for Route {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [channel, topic] => Ok(Route::new(*channel, *topic)),
            _ => Err(CourierError::InvalidRoute(s.to_string())),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.channel, self.topic)
    }
}

/// A topic, optionally on an explicit channel.
///
/// Without a channel the subscribing object's own channel is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicRef {
    pub channel: Option<String>,
    pub topic: String,
}

impl TopicRef {
    /// A topic on the object's own channel
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            channel: None,
            topic: topic.into(),
        }
    }

    pub fn on(channel: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            topic: topic.into(),
        }
    }

    pub fn resolve(&self, default_channel: &str) -> Route {
        Route::new(
            self.channel.as_deref().unwrap_or(default_channel),
            self.topic.clone(),
        )
    }
}

impl FromStr for TopicRef {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [topic] => Ok(TopicRef::topic(*topic)),
            [channel, topic] => Ok(TopicRef::on(*channel, *topic)),
            _ => Err(CourierError::InvalidTopic(s.to_string())),
        }
    }
}

impl From<Route> for TopicRef {
    fn from(route: Route) -> Self {
        TopicRef::on(route.channel, route.topic)
    }
}

impl From<&str> for TopicRef {
    /// A bare topic on the object's own channel; use `parse` for the
    /// `"channel topic"` form.
    fn from(topic: &str) -> Self {
        TopicRef::topic(topic)
    }
}

impl fmt::Display for TopicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => write!(f, "{} {}", channel, self.topic),
            None => write!(f, "{}", self.topic),
        }
    }
}

/// What a local event publishes
#[derive(Debug, Clone)]
pub enum MessageSpec {
    /// Publish the first trigger argument unchanged
    Single(Route),
    /// Publish to each route the payload computed by its accessor
    WithAccessor(Vec<(Route, Accessor)>),
}

impl MessageSpec {
    /// Parse the bare `"channel topic"` form
    pub fn parse(s: &str) -> Result<Self> {
        Ok(MessageSpec::Single(s.parse()?))
    }

    /// Build the accessor form from `("channel topic", accessor)` pairs
    pub fn with_accessors<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Accessor)>,
        S: AsRef<str>,
    {
        let routes = pairs
            .into_iter()
            .map(|(route, accessor)| Ok((route.as_ref().parse::<Route>()?, accessor)))
            .collect::<Result<Vec<(Route, Accessor)>>>()?;
        Ok(MessageSpec::WithAccessor(routes))
    }

    /// Every `(route, accessor)` this spec installs
    pub fn bindings(&self) -> Vec<(Route, Accessor)> {
        match self {
            MessageSpec::Single(route) => vec![(route.clone(), Accessor::identity())],
            MessageSpec::WithAccessor(routes) => routes.clone(),
        }
    }
}

/// Where a handler method receives messages from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionSpec {
    Single(TopicRef),
    Multi(Vec<TopicRef>),
}

impl SubscriptionSpec {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(SubscriptionSpec::Single(s.parse()?))
    }

    pub fn parse_many<I, S>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let topics = specs
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<TopicRef>>>()?;
        Ok(SubscriptionSpec::Multi(topics))
    }

    pub fn topics(&self) -> &[TopicRef] {
        match self {
            SubscriptionSpec::Single(topic) => std::slice::from_ref(topic),
            SubscriptionSpec::Multi(topics) => topics,
        }
    }
}

/// Local event name -> what it publishes
pub type MessageMap = BTreeMap<String, MessageSpec>;

/// Handler method name -> where it receives from
pub type SubscriptionMap = BTreeMap<String, SubscriptionSpec>;

/// One or several subscription strings, as written in a config document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Serializable form of one object's messaging setup.
///
/// Only the string forms can be expressed here; accessor functions have to be
/// attached in code with [`MessageSpec::with_accessors`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Default channel of the object
    pub channel_name: String,
    /// Overrides `channel_name` when resolving the object's channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub messages: BTreeMap<String, String>,
    #[serde(default)]
    pub subscriptions: BTreeMap<String, OneOrMany>,
}

impl MessagingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Name of the object's own channel: the namespace if set, else the
    /// channel name
    pub fn resolved_channel(&self) -> &str {
        self.namespace.as_deref().unwrap_or(&self.channel_name)
    }

    pub fn message_map(&self) -> Result<MessageMap> {
        self.messages
            .iter()
            .map(|(event, route)| -> Result<(String, MessageSpec)> {
                Ok((event.clone(), MessageSpec::parse(route)?))
            })
            .collect()
    }

    pub fn subscription_map(&self) -> Result<SubscriptionMap> {
        self.subscriptions
            .iter()
            .map(|(method, spec)| -> Result<(String, SubscriptionSpec)> {
                let spec = match spec {
                    OneOrMany::One(s) => SubscriptionSpec::parse(s)?,
                    OneOrMany::Many(specs) => SubscriptionSpec::parse_many(specs)?,
                };
                Ok((method.clone(), spec))
            })
            .collect()
    }

    /// Parse every declared string, reporting the first malformed one
    pub fn validate(&self) -> Result<()> {
        if self.resolved_channel().trim().is_empty() {
            return Err(CourierError::Config("channel_name cannot be empty".to_string()));
        }
        self.message_map()?;
        self.subscription_map()?;
        Ok(())
    }
}
