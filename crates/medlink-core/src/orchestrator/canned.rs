//! Safe answers used when every tier has failed.

use super::plan::TierAnswer;
use crate::models::{
    CapabilityKind, ComplianceVerdict, InteractionReport, StructuredPayload,
};

pub const CHAT_REPLY: &str = "I can't reach the assistant right now. For any clinical or dosing \
question, please confirm with a registered pharmacist or doctor before dispensing.";

pub const DOCUMENT_REPLY: &str =
    "The document could not be read. Please enter the details manually.";

pub const VOICE_REPLY: &str =
    "The voice order could not be understood. Please add the items manually.";

pub const INTERACTION_REPLY: &str = "Interaction check is unavailable right now. \
Verify these medicines manually before dispensing.";

pub const MARKET_REPLY: &str = "Market data is unavailable right now.";

pub const FORECAST_REPLY: &str =
    "Forecast is unavailable right now. Review recent sales manually before reordering.";

/// Reply used when a tier answered with a payload but no text.
pub fn summary(capability: CapabilityKind) -> &'static str {
    match capability {
        CapabilityKind::Chat => "Done.",
        CapabilityKind::AnalyzeDocument => "Document analysed.",
        CapabilityKind::VoiceBill => "Voice order processed.",
        CapabilityKind::InteractionCheck => "Interaction check complete.",
        CapabilityKind::MarketLookup => "Market data attached.",
        CapabilityKind::ComplianceCheck => "Compliance check complete.",
        CapabilityKind::Forecast => "Forecast attached.",
    }
}

pub fn chat() -> TierAnswer {
    TierAnswer::reply(CHAT_REPLY)
}

pub fn document() -> TierAnswer {
    TierAnswer::reply(DOCUMENT_REPLY)
}

pub fn voice_bill() -> TierAnswer {
    TierAnswer::reply(VOICE_REPLY)
}

/// Empty findings, explicitly unverified.
pub fn interactions() -> TierAnswer {
    TierAnswer::reply(INTERACTION_REPLY)
        .with_payload(StructuredPayload::Interactions(InteractionReport::unverified()))
}

/// "Unknown, verify manually".
pub fn compliance() -> TierAnswer {
    let verdict = ComplianceVerdict::unknown();
    TierAnswer::reply(verdict.reason.clone()).with_payload(StructuredPayload::Compliance(verdict))
}

pub fn market() -> TierAnswer {
    TierAnswer::reply(MARKET_REPLY)
}

pub fn forecast() -> TierAnswer {
    TierAnswer::reply(FORECAST_REPLY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_answers_are_safe() {
        for answer in [chat(), document(), voice_bill(), interactions(), compliance(), market(), forecast()] {
            assert!(!answer.reply.trim().is_empty());
            assert!(answer.directive.is_none());
        }

        let Some(StructuredPayload::Interactions(report)) = interactions().payload else {
            panic!("expected interactions payload");
        };
        assert!(report.findings.is_empty());
        assert!(!report.verified);

        let Some(StructuredPayload::Compliance(verdict)) = compliance().payload else {
            panic!("expected compliance payload");
        };
        assert!(!verdict.is_banned && !verdict.verified);
    }
}
