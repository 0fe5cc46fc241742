use alloy_primitives::Address;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::error::QbftError;
use crate::messagewrappers::RoundChange;
use crate::payload::{PreparePayload, PreparedRoundMetadata, RoundChangePayload};
use crate::types::{ConsensusRoundIdentifier, QbftBlock, SignatureRecovery, SignedData};
use crate::validation::{RoundChangeMessageValidator, ValidationContext};

/// A quorum of RoundChanges justifying a round, plus the block the round's proposer must
/// re-propose when any of them carried a prepared claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundChangeCertificate {
    round: ConsensusRoundIdentifier,
    round_changes: Vec<SignedData<RoundChangePayload>>,
    mandatory_block: Option<QbftBlock>,
    mandatory_prepares: Vec<SignedData<PreparePayload>>,
}

impl RoundChangeCertificate {
    /// Builds a certificate for `round` out of already validated RoundChanges.
    ///
    /// Messages for other rounds and with an unrecoverable author are skipped, and only the
    /// first message per author counts. Returns `Ok(None)` below `quorum`. When the highest
    /// prepared claims disagree on the block this fails with
    /// [`QbftError::ConflictingPreparedBlocks`].
    pub fn assemble(
        round: ConsensusRoundIdentifier,
        round_changes: &[RoundChange],
        quorum: usize,
        recovery: &dyn SignatureRecovery,
    ) -> Result<Option<Self>, QbftError> {
        let mut authors = HashSet::new();
        let contributing: Vec<&RoundChange> = round_changes
            .iter()
            .filter(|rc| *rc.round_identifier() == round)
            .filter(|rc| rc.author_with(recovery).is_ok_and(|author| authors.insert(author)))
            .collect();
        if contributing.len() < quorum {
            return Ok(None);
        }

        let highest = PreparedRoundMetadata::highest(contributing.iter().filter_map(|rc| rc.prepared_round_metadata()))?;
        let supplier = highest.and_then(|best| contributing.iter().find(|rc| rc.prepared_round_metadata() == Some(&best)));
        let (mandatory_block, mandatory_prepares) = match supplier {
            Some(rc) => (rc.proposed_block().cloned(), rc.prepares().to_vec()),
            None => (None, Vec::new()),
        };

        Ok(Some(Self {
            round,
            round_changes: contributing.iter().map(|rc| rc.signed_payload().clone()).collect(),
            mandatory_block,
            mandatory_prepares,
        }))
    }

    pub fn round(&self) -> &ConsensusRoundIdentifier {
        &self.round
    }

    pub fn round_changes(&self) -> &[SignedData<RoundChangePayload>] {
        &self.round_changes
    }

    pub fn mandatory_block(&self) -> Option<&QbftBlock> {
        self.mandatory_block.as_ref()
    }

    pub fn mandatory_prepares(&self) -> &[SignedData<PreparePayload>] {
        &self.mandatory_prepares
    }

    pub fn into_parts(
        self,
    ) -> (Vec<SignedData<RoundChangePayload>>, Option<QbftBlock>, Vec<SignedData<PreparePayload>>) {
        (self.round_changes, self.mandatory_block, self.mandatory_prepares)
    }
}

#[derive(Debug, Default)]
struct RoundChangeCollection {
    messages: Vec<RoundChange>,
    authors: HashSet<Address>,
    actioned: bool,
}

/// Collects RoundChanges of one height, keyed by target round.
///
/// Collections are only opened for targets within `max_round_distance` of the current
/// round. Farther targets still count towards the early round change.
#[derive(Debug)]
pub struct RoundChangeManager {
    context: ValidationContext,
    validator: RoundChangeMessageValidator,
    collections: BTreeMap<u32, RoundChangeCollection>,
    latest_round_by_author: HashMap<Address, u32>,
    current_round: u32,
    max_round_distance: u32,
}

impl RoundChangeManager {
    pub fn new(context: ValidationContext, max_round_distance: u32) -> Self {
        Self {
            validator: RoundChangeMessageValidator::new(context.clone()),
            context,
            collections: BTreeMap::new(),
            latest_round_by_author: HashMap::new(),
            current_round: 0,
            max_round_distance,
        }
    }

    /// Validates and stores a RoundChange. Returns a certificate the first time its target
    /// round reaches quorum.
    pub fn append(&mut self, round_change: RoundChange) -> Result<Option<RoundChangeCertificate>, QbftError> {
        let author = self.validator.validate(&round_change)?;
        let target = *round_change.round_identifier();

        let latest = self.latest_round_by_author.entry(author).or_insert(target.round_number);
        *latest = (*latest).max(target.round_number);

        if target.round_number.saturating_sub(self.current_round) > self.max_round_distance {
            debug!(
                target: "consensus::qbft::round_change",
                %author, %target, current = self.current_round, "Round change too far ahead, not collecting"
            );
            return Ok(None);
        }
        let collection = self.collections.entry(target.round_number).or_default();
        if collection.actioned {
            trace!(target: "consensus::qbft::round_change", %author, %target, "Round already has a certificate");
            return Ok(None);
        }
        if !collection.authors.insert(author) {
            let recovery = self.context.recovery();
            let equivocates = collection
                .messages
                .iter()
                .find(|existing| existing.author_with(recovery).is_ok_and(|a| a == author))
                .is_some_and(|existing| existing.payload() != round_change.payload());
            if equivocates {
                warn!(target: "consensus::qbft::round_change", %author, %target, "Validator sent two different round changes");
            }
            return Ok(None);
        }
        collection.messages.push(round_change);
        debug!(
            target: "consensus::qbft::round_change",
            %author, %target, received = collection.messages.len(), "Stored round change"
        );

        let quorum = self.context.quorum();
        if collection.messages.len() < quorum {
            return Ok(None);
        }
        let certificate = RoundChangeCertificate::assemble(target, &collection.messages, quorum, self.context.recovery())
            .inspect_err(|e| {
                warn!(target: "consensus::qbft::round_change", %target, error = %e, "Refusing to assemble round-change certificate")
            })?;
        if certificate.is_some() {
            collection.actioned = true;
        }
        Ok(certificate)
    }

    /// The round to jump to once `f+1` validators announced rounds above `current_round`:
    /// the `(f+1)`-th highest of their latest announced rounds.
    pub fn early_round_target(&self, current_round: u32) -> Option<u32> {
        let needed = self.context.fault_tolerance() + 1;
        let mut ahead: Vec<u32> =
            self.latest_round_by_author.values().copied().filter(|round| *round > current_round).collect();
        if ahead.len() < needed {
            return None;
        }
        ahead.sort_unstable_by(|a, b| b.cmp(a));
        ahead.get(needed - 1).copied()
    }

    /// Moves the manager to `round_number`, dropping collections for earlier rounds.
    pub fn discard_rounds_before(&mut self, round_number: u32) {
        self.current_round = self.current_round.max(round_number);
        self.collections.retain(|round, _| *round >= round_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messagewrappers::PreparedCertificate;
    use crate::mocks::{test_block, test_context, test_factories};
    use crate::payload::MessageFactory;
    use crate::types::{RlpBlockCodec, Secp256k1Recovery};
    use assert_matches::assert_matches;

    const HEIGHT: u64 = 1;

    fn prepared(
        factories: &[MessageFactory],
        signers: std::ops::Range<usize>,
        block: &QbftBlock,
        round: u32,
    ) -> PreparedCertificate {
        let prepared_round = ConsensusRoundIdentifier::new(HEIGHT, round);
        let prepares = factories[signers]
            .iter()
            .map(|f| f.create_prepare(prepared_round, block.hash()).unwrap().into_signed_payload())
            .collect();
        PreparedCertificate::new(block.clone(), block.hash(), prepares, round)
    }

    #[test]
    fn mandatory_block_comes_from_prepared_round_changes() {
        let factories = test_factories(4);
        let target = ConsensusRoundIdentifier::new(HEIGHT, 1);
        let block = test_block(HEIGHT, 7);
        let hash = block.hash();

        let with_metadata: Vec<RoundChange> = (0..2)
            .map(|i| {
                let certificate = prepared(&factories, i..i + 1, &block, 0);
                factories[i].create_round_change(target, Some(&certificate)).unwrap()
            })
            .collect();
        let without_metadata: Vec<RoundChange> =
            (2..4).map(|i| factories[i].create_round_change(target, None).unwrap()).collect();

        let received: Vec<RoundChange> = [&with_metadata[..1], &without_metadata[..]]
            .concat()
            .iter()
            .map(|rc| RoundChange::decode(&rc.encode(&RlpBlockCodec), &RlpBlockCodec).unwrap())
            .collect();

        let certificate = RoundChangeCertificate::assemble(target, &received, 3, &Secp256k1Recovery).unwrap().unwrap();
        assert_eq!(certificate.round_changes().len(), 3);
        assert_eq!(certificate.mandatory_block().unwrap().hash(), hash);
        assert_eq!(certificate.mandatory_prepares().len(), 1);

        let all = [with_metadata, without_metadata].concat();
        let certificate = RoundChangeCertificate::assemble(target, &all, 3, &Secp256k1Recovery).unwrap().unwrap();
        assert_eq!(certificate.mandatory_block().unwrap().hash(), hash);
    }

    #[test]
    fn no_claims_leave_the_proposer_free() {
        let factories = test_factories(4);
        let target = ConsensusRoundIdentifier::new(HEIGHT, 2);
        let round_changes: Vec<RoundChange> =
            factories[..3].iter().map(|f| f.create_round_change(target, None).unwrap()).collect();

        let certificate =
            RoundChangeCertificate::assemble(target, &round_changes, 3, &Secp256k1Recovery).unwrap().unwrap();
        assert!(certificate.mandatory_block().is_none());
        assert!(certificate.mandatory_prepares().is_empty());
    }

    #[test]
    fn below_quorum_or_repeated_authors_yield_nothing() {
        let factories = test_factories(4);
        let target = ConsensusRoundIdentifier::new(HEIGHT, 1);
        let first = factories[0].create_round_change(target, None).unwrap();
        let second = factories[1].create_round_change(target, None).unwrap();

        let two = vec![first.clone(), second.clone()];
        assert_eq!(RoundChangeCertificate::assemble(target, &two, 3, &Secp256k1Recovery).unwrap(), None);

        let repeated = vec![first.clone(), second, first];
        assert_eq!(RoundChangeCertificate::assemble(target, &repeated, 3, &Secp256k1Recovery).unwrap(), None);
    }

    #[test]
    fn conflicting_highest_claims_are_reported() {
        let factories = test_factories(4);
        let target = ConsensusRoundIdentifier::new(HEIGHT, 1);
        let block_a = test_block(HEIGHT, 1);
        let block_b = test_block(HEIGHT, 2);
        let round_changes = vec![
            factories[0].create_round_change(target, Some(&prepared(&factories, 0..1, &block_a, 0))).unwrap(),
            factories[1].create_round_change(target, Some(&prepared(&factories, 1..2, &block_b, 0))).unwrap(),
            factories[2].create_round_change(target, None).unwrap(),
        ];

        let err = RoundChangeCertificate::assemble(target, &round_changes, 3, &Secp256k1Recovery).unwrap_err();
        assert_matches!(err, QbftError::ConflictingPreparedBlocks { prepared_round: 0, .. });
    }

    #[test]
    fn manager_emits_certificate_once_at_quorum() {
        let factories = test_factories(4);
        let mut manager = RoundChangeManager::new(test_context(HEIGHT, 4), 10);
        let target = ConsensusRoundIdentifier::new(HEIGHT, 1);

        assert!(manager.append(factories[0].create_round_change(target, None).unwrap()).unwrap().is_none());
        assert!(manager.append(factories[0].create_round_change(target, None).unwrap()).unwrap().is_none());
        assert!(manager.append(factories[1].create_round_change(target, None).unwrap()).unwrap().is_none());
        let certificate = manager.append(factories[2].create_round_change(target, None).unwrap()).unwrap().unwrap();
        assert_eq!(*certificate.round(), target);
        assert!(manager.append(factories[3].create_round_change(target, None).unwrap()).unwrap().is_none());
    }

    #[test]
    fn manager_validates_prepared_claims() {
        let factories = test_factories(4);
        let mut manager = RoundChangeManager::new(test_context(HEIGHT, 4), 10);
        let target = ConsensusRoundIdentifier::new(HEIGHT, 1);
        let block = test_block(HEIGHT, 4);

        let weak = factories[0].create_round_change(target, Some(&prepared(&factories, 0..1, &block, 0))).unwrap();
        assert!(manager.append(weak).unwrap_err().is_message_fault());

        let backed = factories[0].create_round_change(target, Some(&prepared(&factories, 0..3, &block, 0))).unwrap();
        assert!(manager.append(backed).unwrap().is_none());
        manager.append(factories[1].create_round_change(target, None).unwrap()).unwrap();
        let certificate = manager.append(factories[2].create_round_change(target, None).unwrap()).unwrap().unwrap();
        assert_eq!(certificate.mandatory_block(), Some(&block));
        assert_eq!(certificate.mandatory_prepares().len(), 3);
    }

    #[test]
    fn non_validator_round_change_is_rejected() {
        let outsider = test_factories(5).remove(4);
        let mut manager = RoundChangeManager::new(test_context(HEIGHT, 4), 10);
        let rc = outsider.create_round_change(ConsensusRoundIdentifier::new(HEIGHT, 1), None).unwrap();
        assert_matches!(manager.append(rc), Err(QbftError::UnauthorizedAuthor { .. }));
    }

    #[test]
    fn far_future_rounds_are_tracked_but_not_collected() {
        let factories = test_factories(4);
        let mut manager = RoundChangeManager::new(test_context(HEIGHT, 4), 2);
        let far = ConsensusRoundIdentifier::new(HEIGHT, 5);

        for factory in &factories[..3] {
            assert!(manager.append(factory.create_round_change(far, None).unwrap()).unwrap().is_none());
        }
        assert!(manager.collections.is_empty());
        assert_eq!(manager.early_round_target(0), Some(5));

        manager.discard_rounds_before(4);
        manager.append(factories[0].create_round_change(far, None).unwrap()).unwrap();
        manager.append(factories[1].create_round_change(far, None).unwrap()).unwrap();
        let certificate = manager.append(factories[2].create_round_change(far, None).unwrap()).unwrap().unwrap();
        assert_eq!(*certificate.round(), far);
    }

    #[test]
    fn early_round_target_needs_f_plus_one_validators() {
        let factories = test_factories(4);
        let mut manager = RoundChangeManager::new(test_context(HEIGHT, 4), 10);

        manager.append(factories[0].create_round_change(ConsensusRoundIdentifier::new(HEIGHT, 5), None).unwrap()).unwrap();
        assert_eq!(manager.early_round_target(0), None);

        manager.append(factories[1].create_round_change(ConsensusRoundIdentifier::new(HEIGHT, 3), None).unwrap()).unwrap();
        assert_eq!(manager.early_round_target(0), Some(3));
        assert_eq!(manager.early_round_target(3), None);

        manager.append(factories[2].create_round_change(ConsensusRoundIdentifier::new(HEIGHT, 4), None).unwrap()).unwrap();
        assert_eq!(manager.early_round_target(0), Some(4));
    }
}
