//! Ordered tier plans reduced by "first usable answer wins".

use std::future::Future;

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use super::canned;
use crate::error::CapabilityResult;
use crate::models::{
    ActionDirective, CapabilityKind, CapabilityResponse, Provenance, StructuredPayload,
    TierFailure,
};

/// What a single tier produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierAnswer {
    pub reply: String,
    pub payload: Option<StructuredPayload>,
    pub directive: Option<ActionDirective>,
}

impl TierAnswer {
    pub fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: StructuredPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_directive(mut self, directive: Option<ActionDirective>) -> Self {
        self.directive = directive;
        self
    }

    pub fn is_usable(&self) -> bool {
        !self.reply.trim().is_empty() || self.payload.is_some()
    }

    pub(crate) fn into_response(
        self,
        capability: CapabilityKind,
        provenance: Provenance,
        failures: Vec<TierFailure>,
    ) -> CapabilityResponse {
        let reply = match self.reply.trim() {
            "" => canned::summary(capability).to_string(),
            text => text.to_string(),
        };
        CapabilityResponse {
            reply,
            provenance,
            payload: self.payload,
            directive: self.directive,
            failures,
        }
    }
}

type TierFuture<'a> = BoxFuture<'a, CapabilityResult<TierAnswer>>;

/// Lazily-started tiers, tried strictly in order.
pub(crate) struct TierPlan<'a> {
    capability: CapabilityKind,
    tiers: Vec<(Provenance, TierFuture<'a>)>,
}

impl<'a> TierPlan<'a> {
    pub(crate) fn new(capability: CapabilityKind) -> Self {
        Self {
            capability,
            tiers: Vec::new(),
        }
    }

    pub(crate) fn tier<F>(mut self, provenance: Provenance, attempt: F) -> Self
    where
        F: Future<Output = CapabilityResult<TierAnswer>> + Send + 'a,
    {
        self.tiers.push((provenance, Box::pin(attempt)));
        self
    }

    /// Add a tier only when it applies to this request.
    pub(crate) fn tier_if<F>(self, applies: bool, provenance: Provenance, attempt: F) -> Self
    where
        F: Future<Output = CapabilityResult<TierAnswer>> + Send + 'a,
    {
        if applies {
            self.tier(provenance, attempt)
        } else {
            self
        }
    }

    /// Run tiers until one is usable; otherwise the canned answer.
    pub(crate) async fn run(self, canned: TierAnswer) -> CapabilityResponse {
        let TierPlan { capability, tiers } = self;
        let mut failures = Vec::new();

        for (provenance, attempt) in tiers {
            debug!(%capability, tier = %provenance, "attempting tier");
            match attempt.await {
                Ok(answer) if answer.is_usable() => {
                    info!(%capability, tier = %provenance, skipped = failures.len(), "tier answered");
                    return answer.into_response(capability, provenance, failures);
                }
                Ok(_) => {
                    warn!(%capability, tier = %provenance, "tier returned an empty result");
                    failures.push(TierFailure {
                        provenance,
                        error: "empty result".to_string(),
                    });
                }
                Err(e) => {
                    warn!(%capability, tier = %provenance, error = %e, "tier failed");
                    failures.push(TierFailure {
                        provenance,
                        error: e.to_string(),
                    });
                }
            }
        }

        warn!(%capability, failures = failures.len(), "all tiers failed, returning safe default");
        canned.into_response(capability, Provenance::SafeDefault, failures)
    }
}
