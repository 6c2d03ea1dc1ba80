//! Token ledger
//!
//! Running token and cost totals for one session, partitioned by participant
//! slot. The ledger is always derivable from the transcript, so it is never
//! persisted on its own.

use crate::cost::{Cost, CostModel};
use crate::session::{Message, ParticipantConfig, ParticipantSlot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-participant totals inside a [`TokenStats`] snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStats {
    pub name: String,
    pub total_tokens: u64,
    pub cost: f64,
    pub cost_secondary: f64,
}

/// Immutable snapshot of a session's usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub total_tokens: u64,
    /// USD
    pub total_cost: f64,
    /// EUR
    pub total_cost_secondary: f64,
    pub per_participant: BTreeMap<ParticipantSlot, ParticipantStats>,
}

/// Aggregate figures cached on the stored session row
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub total_tokens: u64,
    pub cost: Cost,
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotTotals {
    tokens: u64,
    cost: Cost,
}

#[derive(Debug, Clone)]
pub struct TokenLedger {
    cost_model: CostModel,
    slots: [SlotTotals; 2],
}

impl TokenLedger {
    pub fn new(cost_model: CostModel) -> Self {
        Self {
            cost_model,
            slots: [SlotTotals::default(); 2],
        }
    }

    /// Rebuild the ledger for a transcript loaded from storage
    pub fn from_transcript(
        cost_model: CostModel,
        participants: &[ParticipantConfig; 2],
        transcript: &[Message],
    ) -> Self {
        let mut ledger = Self::new(cost_model);
        for message in transcript {
            let model = &participants[message.participant.index()].model;
            ledger.record(message.participant, model, message.usage.total());
        }
        ledger
    }

    /// Add `tokens` generated by `slot` on `model_id`
    pub fn record(&mut self, slot: ParticipantSlot, model_id: &str, tokens: u64) {
        let cost = self.cost_model.cost(model_id, tokens);
        let totals = &mut self.slots[slot.index()];
        totals.tokens += tokens;
        totals.cost.add(cost);
    }

    pub fn total_tokens(&self) -> u64 {
        self.slots.iter().map(|s| s.tokens).sum()
    }

    pub fn total_cost(&self) -> Cost {
        let mut total = Cost::default();
        for slot in &self.slots {
            total.add(slot.cost);
        }
        total
    }

    pub fn totals(&self) -> Totals {
        Totals {
            total_tokens: self.total_tokens(),
            cost: self.total_cost(),
        }
    }

    /// Owned copy of the current totals, labelled with display names
    pub fn snapshot(&self, participants: &[ParticipantConfig; 2]) -> TokenStats {
        let total = self.total_cost();
        let per_participant = ParticipantSlot::BOTH
            .into_iter()
            .map(|slot| {
                let totals = self.slots[slot.index()];
                (
                    slot,
                    ParticipantStats {
                        name: participants[slot.index()].name.clone(),
                        total_tokens: totals.tokens,
                        cost: totals.cost.usd,
                        cost_secondary: totals.cost.eur,
                    },
                )
            })
            .collect();

        TokenStats {
            total_tokens: self.total_tokens(),
            total_cost: total.usd,
            total_cost_secondary: total.eur,
            per_participant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Usage;
    use chrono::Utc;
    use proptest::prelude::*;

    fn participants() -> [ParticipantConfig; 2] {
        [
            ParticipantConfig::new("Alice", "gpt-4o", "p1"),
            ParticipantConfig::new("Bob", "gpt-3.5-turbo", "p2"),
        ]
    }

    fn message(sequence: u64, slot: ParticipantSlot, tokens: u64) -> Message {
        Message {
            sequence,
            participant: slot,
            speaker: "x".to_string(),
            text: "t".to_string(),
            timestamp: Utc::now(),
            usage: Usage::new(0, tokens),
        }
    }

    #[test]
    fn test_record_partitions_by_slot() {
        let mut ledger = TokenLedger::new(CostModel::default());
        ledger.record(ParticipantSlot::One, "gpt-4o", 100);
        ledger.record(ParticipantSlot::Two, "gpt-3.5-turbo", 50);
        ledger.record(ParticipantSlot::One, "gpt-4o", 10);

        let stats = ledger.snapshot(&participants());
        assert_eq!(stats.total_tokens, 160);
        assert_eq!(stats.per_participant[&ParticipantSlot::One].total_tokens, 110);
        assert_eq!(stats.per_participant[&ParticipantSlot::Two].total_tokens, 50);
        assert_eq!(stats.per_participant[&ParticipantSlot::One].name, "Alice");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut ledger = TokenLedger::new(CostModel::default());
        ledger.record(ParticipantSlot::One, "gpt-4o", 100);
        let before = ledger.snapshot(&participants());
        ledger.record(ParticipantSlot::One, "gpt-4o", 100);
        assert_eq!(before.total_tokens, 100);
        assert_eq!(ledger.total_tokens(), 200);
    }

    #[test]
    fn test_snapshot_serializes_slot_keys() {
        let ledger = TokenLedger::new(CostModel::default());
        let json = serde_json::to_value(ledger.snapshot(&participants())).unwrap();
        assert!(json["per_participant"]["participant-1"].is_object());
        assert_eq!(json["per_participant"]["participant-2"]["name"], "Bob");
    }

    proptest! {
        #[test]
        fn prop_total_equals_transcript_sum(
            turns in proptest::collection::vec((any::<bool>(), 0u64..5000), 0..40)
        ) {
            let transcript: Vec<Message> = turns
                .iter()
                .enumerate()
                .map(|(i, (first, tokens))| {
                    let slot = if *first { ParticipantSlot::One } else { ParticipantSlot::Two };
                    message(i as u64 + 1, slot, *tokens)
                })
                .collect();

            let ledger = TokenLedger::from_transcript(CostModel::default(), &participants(), &transcript);
            let stats = ledger.snapshot(&participants());
            let sum: u64 = transcript.iter().map(|m| m.usage.total()).sum();

            prop_assert_eq!(stats.total_tokens, sum);
            let partitioned: u64 = stats.per_participant.values().map(|p| p.total_tokens).sum();
            prop_assert_eq!(partitioned, sum);
        }
    }
}
