//! Iterative resolution from the root servers down.
//!
//! Every lookup starts at a randomly picked root server and follows
//! referrals until some server answers. Aliases (CNAME) and nameserver
//! addresses missing from a referral are looked up as nested resolutions,
//! each again starting from a freshly picked root.
//!
//! Nesting is kept on an explicit stack of [`ResolutionContext`]s instead of
//! the call stack, and is bounded by [`ResolverConfig::max_depth`].

use std::net::IpAddr;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::dns_client::{Transport, TransportError};
use crate::dns_record::{Query, RecordType, ResourceRecord, Response};
use crate::root_hints::RootSelector;

pub const DEFAULT_MAX_DEPTH: usize = 30;
pub const DEFAULT_MAX_REFERRALS: usize = 30;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),
    #[error("break in the chain")]
    BrokenChain,
    #[error("chain longer than {limit} steps")]
    ChainTooLong { limit: usize },
    #[error("expected {expected} record, found {found}")]
    UnexpectedRecord {
        expected: RecordType,
        found: RecordType,
    },
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// CNAME chases plus nameserver address lookups allowed per resolution.
    pub max_depth: usize,
    /// Referrals followed while asking one question.
    pub max_referrals: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_referrals: DEFAULT_MAX_REFERRALS,
        }
    }
}

/// The question in flight and the server it is being asked.
#[derive(Debug)]
struct ResolutionContext {
    query: Query,
    nameserver: IpAddr,
    referrals: usize,
}

/// What a single response tells the engine to do next.
enum Step {
    Answer(Vec<ResourceRecord>),
    Alias(String),
    NeedAddress(String),
    Referral(IpAddr),
}

pub struct Resolver<T, R> {
    transport: T,
    roots: RootSelector<R>,
    config: ResolverConfig,
}

impl<T: Transport, R: Rng> Resolver<T, R> {
    pub fn with_config(transport: T, rng: R, config: ResolverConfig) -> Self {
        Resolver {
            transport,
            roots: RootSelector::new(rng),
            config,
        }
    }

    fn context(&mut self, query: Query) -> ResolutionContext {
        ResolutionContext {
            query,
            nameserver: self.roots.pick(),
            referrals: 0,
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn resolve(
        &mut self,
        name: &str,
        qtype: RecordType,
    ) -> Result<Vec<ResourceRecord>, ResolveError> {
        let mut depth = 0;
        let first = self.context(Query::new(name, qtype));
        // frames above the first one are nameserver address lookups
        let mut stack = vec![first];

        loop {
            let Some(ctx) = stack.last_mut() else {
                return Err(ResolveError::BrokenChain);
            };

            let step = match self.step(ctx) {
                Ok(step) => step,
                Err(e) => return Err(unwind(e, stack.len())),
            };

            match step {
                Step::Referral(next) => self.follow(ctx, next)?,
                Step::Alias(target) => {
                    depth = self.descend(depth)?;
                    trace!(alias = %ctx.query.name, %target, "Following CNAME");
                    let query = Query::new(&target, ctx.query.qtype);
                    *ctx = self.context(query);
                }
                Step::NeedAddress(host) => {
                    depth = self.descend(depth)?;
                    trace!(zone = %ctx.query.name, ns = %host, "Resolving NS address (no glue)");
                    let lookup = self.context(Query::new(&host, RecordType::A));
                    stack.push(lookup);
                }
                Step::Answer(records) => {
                    stack.pop();
                    let Some(parent) = stack.last_mut() else {
                        return Ok(records);
                    };
                    let Some(addr) = first_ipv4(&records) else {
                        debug!(ns = %parent.query.name, "Nameserver lookup returned no A record");
                        return Err(unwind(ResolveError::BrokenChain, stack.len()));
                    };
                    self.follow(parent, addr)?;
                }
            }
        }
    }

    /// Asks the current nameserver and interprets its response.
    fn step(&self, ctx: &ResolutionContext) -> Result<Step, ResolveError> {
        debug!("Asking {} about {}", ctx.nameserver, ctx.query.name);
        let Response {
            answer,
            authority,
            additional,
        } = self.transport.exchange(&ctx.query, ctx.nameserver)?;

        // only the first answer record decides whether this is an alias
        if let Some(ResourceRecord::CNAME { target, .. }) = answer.first() {
            return Ok(Step::Alias(target.clone()));
        }
        if !answer.is_empty() {
            return Ok(Step::Answer(answer));
        }

        if additional.is_empty() && !authority.is_empty() {
            return first_ns(&authority).map(Step::NeedAddress);
        }

        next_hop(&additional)
            .map(Step::Referral)
            .ok_or(ResolveError::BrokenChain)
    }

    fn follow(&self, ctx: &mut ResolutionContext, next: IpAddr) -> Result<(), ResolveError> {
        ctx.referrals += 1;
        if ctx.referrals > self.config.max_referrals {
            return Err(ResolveError::ChainTooLong {
                limit: self.config.max_referrals,
            });
        }
        trace!(from = %ctx.nameserver, to = %next, "Referral");
        ctx.nameserver = next;
        Ok(())
    }

    fn descend(&self, depth: usize) -> Result<usize, ResolveError> {
        let depth = depth + 1;
        if depth > self.config.max_depth {
            return Err(ResolveError::ChainTooLong {
                limit: self.config.max_depth,
            });
        }
        Ok(depth)
    }
}

/// A failure inside a nameserver address lookup is a broken chain for the
/// frame waiting on it. Length limits describe the whole chain and pass
/// through as they are.
fn unwind(err: ResolveError, open_frames: usize) -> ResolveError {
    match err {
        ResolveError::ChainTooLong { .. } => err,
        _ if open_frames > 1 => {
            debug!(error = %err, "Nameserver address lookup failed");
            ResolveError::BrokenChain
        }
        _ => err,
    }
}

fn first_ns(authority: &[ResourceRecord]) -> Result<String, ResolveError> {
    authority
        .iter()
        .find_map(|rr| match rr {
            ResourceRecord::NS { host, .. } => Some(host.clone()),
            _ => None,
        })
        .ok_or_else(|| ResolveError::UnexpectedRecord {
            expected: RecordType::NS,
            found: authority.first().map_or(RecordType::NS, ResourceRecord::rtype),
        })
}

/// First A or AAAA glue record, whichever family comes first.
fn next_hop(additional: &[ResourceRecord]) -> Option<IpAddr> {
    additional.iter().find_map(|rr| match rr {
        ResourceRecord::A { addr, .. } => Some(IpAddr::V4(*addr)),
        ResourceRecord::AAAA { addr, .. } => Some(IpAddr::V6(*addr)),
        ResourceRecord::NS { .. }
        | ResourceRecord::CNAME { .. }
        | ResourceRecord::SOA { .. }
        | ResourceRecord::Unknown { .. } => None,
    })
}

fn first_ipv4(records: &[ResourceRecord]) -> Option<IpAddr> {
    records.iter().find_map(|rr| match rr {
        ResourceRecord::A { addr, .. } => Some(IpAddr::V4(*addr)),
        _ => None,
    })
}
