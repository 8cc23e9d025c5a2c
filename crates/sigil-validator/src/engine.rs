//! The event orchestrator: drives a query through classification, trust
//! chain construction and validation, and applies the emission policy.

use crate::anchors::TrustAnchorStore;
use crate::classify::{self, ResponseClass};
use crate::config::ValidatorConfig;
use crate::keycache::KeyCache;
use crate::status::{Reason, SecMessage, SecurityStatus};
use async_trait::async_trait;
use sigil_proto::{Message, Name, Question, RecordType};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Errors surfaced by an upstream transport.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The query timed out.
    #[error("upstream query timed out")]
    Timeout,
    /// A transport-level failure.
    #[error("upstream I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The upstream produced something unusable.
    #[error("upstream protocol error: {0}")]
    Protocol(String),
}

/// The capability the orchestrator uses for all outbound DNS.
///
/// The embedding application supplies the transport; the engine only ever
/// calls `send` and applies its own deadline on top.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends one query and returns the upstream's response.
    async fn send(&self, query: &Message) -> Result<Message, UpstreamError>;
}

/// Orchestrator states of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventState {
    /// Dispatching the user query.
    Init,
    /// Fetching DS/DNSKEY material for the trust chain.
    NeedKeys,
    /// Running signature verification and denial proofs.
    Verifying,
    /// A final status has been determined.
    Done,
}

/// One in-flight validation: the immutable user query plus the engine's
/// mutable working state.
///
/// Dependent fetches carry a depth instead of a parent pointer; the depth
/// bound alone prevents unbounded dependency chains.
#[derive(Debug)]
pub(crate) struct Event {
    /// The query as the user asked it. Never modified.
    pub original: Question,
    /// The query currently on the wire (rewritten to DS/DNSKEY while the
    /// chain is built).
    pub current: Question,
    /// Dependency depth consumed so far.
    pub depth: u8,
    /// Orchestrator state.
    pub state: EventState,
}

impl Event {
    fn new(original: Question) -> Self {
        Self {
            current: original.clone(),
            original,
            depth: 0,
            state: EventState::Init,
        }
    }

    /// Moves the event to a new state, leaving a trace of where it stands.
    fn transition(&mut self, state: EventState) {
        trace!(
            original = %self.original,
            current = %self.current,
            depth = self.depth,
            from = ?self.state,
            to = ?state,
            "event transition"
        );
        self.state = state;
    }
}

/// Per-request execution context: the shared validator, the upstream
/// capability and the remaining query budget.
pub(crate) struct Session<'a, U: Upstream + ?Sized> {
    pub(crate) validator: &'a Validator,
    pub(crate) upstream: &'a U,
    pub(crate) event: Event,
    queries_left: u16,
    pub(crate) now: u32,
}

impl<'a, U: Upstream + ?Sized> Session<'a, U> {
    fn new(validator: &'a Validator, upstream: &'a U, question: Question) -> Self {
        Self {
            validator,
            upstream,
            event: Event::new(question),
            queries_left: validator.config.max_queries_per_request,
            now: validator.config.validation_time(),
        }
    }

    /// Consumes dependency depth; errors once the bound is hit.
    pub(crate) fn descend(&mut self) -> Result<(), Reason> {
        if self.event.depth >= self.validator.config.max_chain_depth {
            return Err(Reason::MaxChainDepth);
        }
        self.event.depth += 1;
        Ok(())
    }

    /// Sends one DNSSEC-requesting query through the upstream, within the
    /// configured deadline and query budget.
    ///
    /// A timeout or transport failure is reported as `Unreachable` and
    /// never cached; only the requesting event is affected.
    pub(crate) async fn fetch(
        &mut self,
        qname: &Name,
        qtype: RecordType,
    ) -> Result<SecMessage, Reason> {
        if self.queries_left == 0 {
            return Err(Reason::MaxQueries);
        }
        self.queries_left -= 1;
        self.event.current = Question::new(qname.clone(), qtype);

        let query = Message::query_dnssec(Question::new(qname.clone(), qtype));
        let response = tokio::time::timeout(
            self.validator.config.query_timeout,
            self.upstream.send(&query),
        )
        .await
        .map_err(|_| {
            warn!(qname = %qname, %qtype, "upstream query timed out");
            Reason::Unreachable
        })?
        .map_err(|e| {
            warn!(qname = %qname, %qtype, error = %e, "upstream query failed");
            Reason::Unreachable
        })?;

        Ok(SecMessage::from_message(response))
    }
}

/// The DNSSEC validation engine.
///
/// One `Validator` is shared by all concurrent queries; the key cache is
/// the only mutable state behind it.
pub struct Validator {
    pub(crate) config: ValidatorConfig,
    pub(crate) anchors: TrustAnchorStore,
    pub(crate) cache: KeyCache,
}

impl Validator {
    /// Creates a validator with the given trust anchors and configuration.
    pub fn new(anchors: TrustAnchorStore, config: ValidatorConfig) -> Self {
        let cache = KeyCache::new(config.key_cache_size);
        Self {
            config,
            anchors,
            cache,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validates a user query end to end and returns the annotated
    /// response.
    ///
    /// The upstream is queried for the answer itself and for any DS and
    /// DNSKEY RRsets the trust chain needs. The returned message carries
    /// the overall security status; [`Validator::resolve`] applies the
    /// user-visible emission policy on top.
    #[instrument(
        skip(self, query, upstream),
        fields(qname = tracing::field::Empty, qtype = tracing::field::Empty)
    )]
    pub async fn validate<U: Upstream + ?Sized>(
        &self,
        query: &Message,
        upstream: &U,
    ) -> SecMessage {
        let Some(question) = query.question().cloned() else {
            let mut out = SecMessage::from_message(Message::response_from(query));
            out.set_status(SecurityStatus::Bogus, Some(Reason::Malformed));
            return out;
        };

        tracing::Span::current().record("qname", tracing::field::display(&question.qname));
        tracing::Span::current().record("qtype", tracing::field::display(&question.qtype));

        let mut session = Session::new(self, upstream, question.clone());

        // CD set: the client explicitly asked for unvalidated data
        // (RFC 4035 Section 3.2.2).
        if query.header().checking_disabled {
            debug!("checking disabled; passing response through unvalidated");
            let mut out = match session.fetch(&question.qname, question.qtype).await {
                Ok(resp) => resp,
                Err(reason) => return self.failed(query, reason),
            };
            out.set_status(SecurityStatus::Insecure, None);
            return out;
        }

        let mut response = match session.fetch(&question.qname, question.qtype).await {
            Ok(resp) => resp,
            Err(reason) => return self.failed(query, reason),
        };

        let (status, reason) = self.run(&mut session, &mut response, &question).await;
        session.event.transition(EventState::Done);
        self.cache.prune_fetch_locks();

        debug!(
            qname = %question.qname,
            qtype = %question.qtype,
            %status,
            reason = reason.map(|r| r.to_string()).unwrap_or_default(),
            "validation finished"
        );
        response.set_status(status, reason);
        response
    }

    /// Validates a query and applies the emission policy: bogus answers
    /// become SERVFAIL with an extended error, everything else passes
    /// through with the AD bit reflecting the verdict.
    pub async fn resolve<U: Upstream + ?Sized>(&self, query: &Message, upstream: &U) -> Message {
        let validated = self.validate(query, upstream).await;
        match validated.status() {
            SecurityStatus::Bogus => validated.to_servfail(query.edns().is_some()),
            _ => validated.to_message(),
        }
    }

    /// Classifies and validates one response, driving the trust chain as
    /// needed.
    async fn run<U: Upstream + ?Sized>(
        &self,
        session: &mut Session<'_, U>,
        response: &mut SecMessage,
        question: &Question,
    ) -> (SecurityStatus, Option<Reason>) {
        session.event.transition(EventState::Verifying);
        let class = classify::classify(response);

        if class == ResponseClass::Unknown {
            return (SecurityStatus::Bogus, Some(Reason::Unclassifiable));
        }

        let signer = classify::find_signer(response, class, &question.qname);

        let Some(signer) = signer else {
            // Unsigned response: provably insecure or bogus, decided by
            // walking the chain towards the query name itself.
            session.event.transition(EventState::NeedKeys);
            return match session.ensure_chain(&question.qname).await {
                Ok(entry) if entry.is_null() => (SecurityStatus::Insecure, None),
                Ok(entry) if entry.is_bad() => {
                    (SecurityStatus::Bogus, Some(Reason::BadKeyCached))
                }
                Ok(_) => (SecurityStatus::Bogus, Some(Reason::MissingSignature)),
                Err(Reason::NoTrustAnchor) => {
                    (SecurityStatus::Indeterminate, Some(Reason::NoTrustAnchor))
                }
                Err(reason) => (SecurityStatus::Bogus, Some(reason)),
            };
        };

        session.event.transition(EventState::NeedKeys);
        let entry = match session.ensure_chain(&signer).await {
            Ok(entry) => entry,
            Err(Reason::NoTrustAnchor) => {
                return (SecurityStatus::Indeterminate, Some(Reason::NoTrustAnchor))
            }
            Err(reason) => return (SecurityStatus::Bogus, Some(reason)),
        };

        if entry.is_null() {
            return (SecurityStatus::Insecure, None);
        }
        if entry.is_bad() {
            return (SecurityStatus::Bogus, Some(Reason::BadKeyCached));
        }

        session.event.transition(EventState::Verifying);
        match class {
            ResponseClass::Positive | ResponseClass::Cname | ResponseClass::Any => {
                session.validate_positive(response, question, &entry).await
            }
            ResponseClass::NxDomain => {
                session
                    .validate_nxdomain(response, &question.qname, &entry)
                    .await
            }
            ResponseClass::NoData => session.validate_nodata(response, question, &entry).await,
            ResponseClass::Unknown => unreachable!("unknown class rejected above"),
        }
    }

    /// Builds the bogus result for a request that failed before any
    /// response was available.
    fn failed(&self, query: &Message, reason: Reason) -> SecMessage {
        let mut out = SecMessage::from_message(Message::response_from(query));
        out.set_status(SecurityStatus::Bogus, Some(reason));
        out
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("anchored_zones", &!self.anchors.is_empty())
            .field("cached_keys", &self.cache.len())
            .finish()
    }
}
