//! Request envelope and discovery filter types.
//!
//! A [`Message`] is the envelope MCollective agents exchange: routing fields
//! (`senderid`, `agent`, `collective`), request bookkeeping (`msgtime`,
//! `ttl`, `requestid`), the payload `body` and a [`Filter`] narrowing which
//! remote nodes should act. The envelope behaves like an ordered mapping:
//! fields can be added, replaced and removed after construction, and length
//! and iteration always reflect the live field set.

use crate::config::Settings;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Comparison operators MCollective accepts in fact filters.
///
/// The set is closed; anything else is rejected when the fact is added,
/// before any network interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactOperator {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `=~` (regular expression match)
    #[serde(rename = "=~")]
    Match,
    /// `<=`
    #[serde(rename = "<=")]
    LtEq,
    /// `=>` (alternate spelling of `>=`)
    #[serde(rename = "=>")]
    GtEqAlt,
    /// `>=`
    #[serde(rename = ">=")]
    GtEq,
    /// `=<` (alternate spelling of `<=`)
    #[serde(rename = "=<")]
    LtEqAlt,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `!=`
    #[serde(rename = "!=")]
    NotEq,
}

impl FactOperator {
    /// The operator as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Match => "=~",
            Self::LtEq => "<=",
            Self::GtEqAlt => "=>",
            Self::GtEq => ">=",
            Self::LtEqAlt => "=<",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::NotEq => "!=",
        }
    }
}

impl fmt::Display for FactOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactOperator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "==" => Ok(Self::Eq),
            "=~" => Ok(Self::Match),
            "<=" => Ok(Self::LtEq),
            "=>" => Ok(Self::GtEqAlt),
            ">=" => Ok(Self::GtEq),
            "=<" => Ok(Self::LtEqAlt),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            "!=" => Ok(Self::NotEq),
            other => Err(Error::BadFilterOperator { operator: other.to_string() }),
        }
    }
}

/// One fact predicate inside a [`Filter`].
///
/// Serializes with the `:fact`/`:value`/`:operator` keys MCollective
/// expects; a record without an operator carries exactly two keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactFilter {
    /// Fact name, e.g. `country`
    #[serde(rename = ":fact")]
    pub fact: String,
    /// Value or pattern the fact is compared against
    #[serde(rename = ":value")]
    pub value: String,
    /// Comparison operator; absent means the default equality match
    #[serde(rename = ":operator", default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<FactOperator>,
}

/// Discovery filter narrowing which nodes act on a request.
///
/// Four independent predicate lists, each preserving insertion order. An
/// empty filter matches everything.
///
/// # Examples
///
/// ```rust
/// use marionette::message::Filter;
///
/// let mut filter = Filter::new();
/// filter.add_agent("package").add_identity("web01.example.com");
/// filter.add_fact_matching("country", "/uk/", "==").unwrap();
///
/// assert_eq!(filter.agents(), ["package"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    cf_class: Vec<String>,
    agent: Vec<String>,
    fact: Vec<FactFilter>,
    identity: Vec<String>,
}

impl Filter {
    /// Create an empty (unrestricted) filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to nodes with the given configuration class applied.
    pub fn add_class(&mut self, name: impl Into<String>) -> &mut Self {
        self.cf_class.push(name.into());
        self
    }

    /// Restrict to nodes with the given agent installed.
    pub fn add_agent(&mut self, name: impl Into<String>) -> &mut Self {
        self.agent.push(name.into());
        self
    }

    /// Restrict to the node with the given identity.
    pub fn add_identity(&mut self, name: impl Into<String>) -> &mut Self {
        self.identity.push(name.into());
        self
    }

    /// Restrict by fact value with the default equality match.
    pub fn add_fact(&mut self, fact: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fact.push(FactFilter { fact: fact.into(), value: value.into(), operator: None });
        self
    }

    /// Restrict by fact value compared with an explicit operator.
    ///
    /// # Errors
    /// Returns [`Error::BadFilterOperator`] for an operator outside the
    /// supported set; the fact list is left untouched.
    pub fn add_fact_matching(
        &mut self,
        fact: impl Into<String>,
        value: impl Into<String>,
        operator: &str,
    ) -> Result<&mut Self> {
        let operator = operator.parse()?;
        self.fact.push(FactFilter {
            fact: fact.into(),
            value: value.into(),
            operator: Some(operator),
        });
        Ok(self)
    }

    /// Configuration classes, in insertion order.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.cf_class
    }

    /// Agent names, in insertion order.
    #[must_use]
    pub fn agents(&self) -> &[String] {
        &self.agent
    }

    /// Fact predicates, in insertion order.
    #[must_use]
    pub fn facts(&self) -> &[FactFilter] {
        &self.fact
    }

    /// Node identities, in insertion order.
    #[must_use]
    pub fn identities(&self) -> &[String] {
        &self.identity
    }

    /// Whether no predicate has been added at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cf_class.is_empty()
            && self.agent.is_empty()
            && self.fact.is_empty()
            && self.identity.is_empty()
    }
}

/// The request envelope sent to (and received from) the bus.
///
/// Behaves like an insertion-ordered mapping from field name to JSON value.
/// The well-known fields are placed at construction; ad hoc fields can be
/// added, replaced and removed afterwards, and [`len`](Message::len) and
/// iteration always reflect the live set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: IndexMap<String, Value>,
}

impl Message {
    /// Start building a message.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Produce a fresh request id in the 32-hex-character format agents
    /// expect.
    ///
    /// Request ids are always caller-supplied; nothing generates one
    /// implicitly. Uniqueness per request is the caller's responsibility
    /// and this helper simply makes that easy to honor.
    #[must_use]
    pub fn generate_request_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Get a field by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Number of fields currently in the envelope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the envelope holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over field names, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over field name/value pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The sending node's identity.
    #[must_use]
    pub fn sender_id(&self) -> Option<&str> {
        self.str_field("senderid")
    }

    /// Construction time, in epoch seconds.
    #[must_use]
    pub fn msg_time(&self) -> Option<i64> {
        self.fields.get("msgtime").and_then(Value::as_i64)
    }

    /// Time-to-live in seconds.
    #[must_use]
    pub fn ttl(&self) -> Option<i64> {
        self.fields.get("ttl").and_then(Value::as_i64)
    }

    /// Caller-supplied request id.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.str_field("requestid")
    }

    /// Request payload.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.fields.get("body")
    }

    /// Target agent name.
    #[must_use]
    pub fn agent(&self) -> Option<&str> {
        self.str_field("agent")
    }

    /// Target collective.
    #[must_use]
    pub fn collective(&self) -> Option<&str> {
        self.str_field("collective")
    }

    /// The discovery filter, decoded from the envelope.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMessage`] if the `filter` field is absent or
    /// does not decode.
    pub fn filter(&self) -> Result<Filter> {
        let value = self.fields.get("filter").ok_or_else(|| Error::InvalidMessage {
            message: "filter field is missing".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| Error::InvalidMessage {
            message: format!("filter field does not decode: {e}"),
        })
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Builder for request envelopes.
///
/// `body`, `agent` and `request_id` are required; `ttl` and `collective`
/// fall back to the settings (`ttl` key, default 60; `main_collective` key,
/// default `mcollective`); the filter defaults to unrestricted.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    body: Option<Value>,
    agent: Option<String>,
    request_id: Option<String>,
    ttl: Option<i64>,
    collective: Option<String>,
    filter: Option<Filter>,
}

impl MessageBuilder {
    /// Set the request payload.
    #[must_use]
    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the target agent.
    #[must_use]
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Set the caller-supplied request id.
    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Override the time-to-live.
    #[must_use]
    pub fn ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Override the target collective.
    #[must_use]
    pub fn collective(mut self, collective: impl Into<String>) -> Self {
        self.collective = Some(collective.into());
        self
    }

    /// Set the discovery filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Build the envelope against the given settings.
    ///
    /// `senderid` is the settings' `identity` value and `msgtime` is the
    /// current epoch time.
    ///
    /// # Errors
    /// Returns [`Error::MissingIdentity`] if the settings cannot supply an
    /// `identity` (a configuration precondition, not a runtime failure) and
    /// [`Error::InvalidMessage`] if a required field was never set.
    pub fn build(self, settings: &Settings) -> Result<Message> {
        let sender_id = settings.get("identity").map_err(|_| Error::MissingIdentity)?.to_string();

        let body = required(self.body, "body")?;
        let agent = required(self.agent, "agent")?;
        let request_id = required(self.request_id, "request_id")?;

        let ttl = match self.ttl {
            Some(ttl) => ttl,
            None => settings.get_int_or("ttl", 60)?,
        };
        let collective = self
            .collective
            .unwrap_or_else(|| settings.get_or("main_collective", "mcollective").to_string());
        let filter = serde_json::to_value(self.filter.unwrap_or_default())?;

        let mut fields = IndexMap::new();
        fields.insert("senderid".to_string(), Value::from(sender_id));
        fields.insert("msgtime".to_string(), Value::from(chrono::Utc::now().timestamp()));
        fields.insert("ttl".to_string(), Value::from(ttl));
        fields.insert("requestid".to_string(), Value::from(request_id));
        fields.insert("body".to_string(), body);
        fields.insert("agent".to_string(), Value::from(agent));
        fields.insert("collective".to_string(), Value::from(collective));
        fields.insert("filter".to_string(), filter);

        Ok(Message { fields })
    }
}

fn required<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| Error::InvalidMessage { message: format!("{name} is required") })
}
