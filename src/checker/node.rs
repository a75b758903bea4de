//! Node records: labels, cache population, properties and the label index.

use rustc_hash::FxHashSet;

use super::cache::{node_slot, Cache};
use super::compliance::SchemaComplianceChecker;
use super::dynamic::{read_chain, ChainRead};
use super::property::SafePropertyChainReader;
use super::scan::TokenScanCursor;
use super::token::{TokenKind, TokenUse};
use super::CheckerContext;
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::schema::EntityType;
use crate::store::{decode_labels, reference, LabelField, NodeRecord, NULL_REFERENCE};

/// Raw label ids of `node`, following the overflow chain when needed. `None` when the
/// labels cannot be read; the problem has been reported.
pub(crate) fn read_labels(ctx: &CheckerContext, node: &NodeRecord) -> Result<Option<Vec<i64>>> {
    let first = match &node.labels {
        LabelField::Inline(labels) => return Ok(Some(labels.to_vec())),
        LabelField::Dynamic(first) => *first,
    };
    let reporter = ctx.reporter();
    let not_in_use = || {
        reporter.report(
            RecordType::Node,
            node.id,
            Inconsistency::DynamicLabelRecordNotInUse { record: first },
        )
    };
    let Some(first_id) = reference(first) else {
        not_in_use();
        return Ok(None);
    };
    let store = ctx.stores().node_labels.as_ref();
    match read_chain(ctx, store, RecordType::NodeDynamicLabel, first_id)? {
        ChainRead::FirstNotInUse => {
            not_in_use();
            Ok(None)
        }
        ChainRead::Read {
            first_empty: true, ..
        } => {
            reporter.report(
                RecordType::NodeDynamicLabel,
                first_id,
                Inconsistency::EmptyBlock,
            );
            Ok(None)
        }
        ChainRead::Read { ok: false, .. } => Ok(None),
        ChainRead::Read { bytes, .. } => match decode_labels(&bytes) {
            Ok((owner, labels)) => {
                if owner != node.id as i64 {
                    reporter.report(
                        RecordType::NodeDynamicLabel,
                        first_id,
                        Inconsistency::OrphanDynamicLabelRecordDueToInvalidOwner { owner },
                    );
                }
                Ok(Some(labels))
            }
            Err(err) => {
                reporter.report(
                    RecordType::NodeDynamicLabel,
                    first_id,
                    Inconsistency::RecordNotDecodable {
                        detail: err.to_string(),
                    },
                );
                Ok(None)
            }
        },
    }
}

/// Sorted, distinct, non-negative labels.
fn label_set(labels: &[i64]) -> Vec<i64> {
    let mut set: Vec<i64> = labels.iter().copied().filter(|&l| l >= 0).collect();
    set.sort_unstable();
    set.dedup();
    set
}

enum NodeState {
    NotInUse,
    /// In use; labels are `None` when they could not be read.
    InUse(Option<Vec<i64>>),
}

pub(crate) struct NodeChecker<'a> {
    ctx: &'a CheckerContext,
    compliance: &'a SchemaComplianceChecker<'a>,
}

impl<'a> NodeChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext, compliance: &'a SchemaComplianceChecker<'a>) -> Self {
        Self { ctx, compliance }
    }

    /// Checks the nodes of `cache`'s range and fills its `NODE_LINK` slots. The label index
    /// scan of the last range runs on to the end of the id space.
    pub(crate) fn check(&self, cache: &Cache, last_range: bool) -> Result<()> {
        let check_label_index = self.ctx.flags().check_label_index;
        self.ctx.execution().run("nodes", cache.range(), |chunk| {
            let mut entries = TokenScanCursor::new(if check_label_index {
                let scan = if chunk.last && last_range {
                    chunk.range.to_end_of_space()
                } else {
                    chunk.range
                };
                self.ctx.label_index().entries(scan)?
            } else {
                Vec::new()
            });
            for id in chunk.range.start..chunk.range.end {
                let state = self.check_node(cache, id)?;
                if check_label_index {
                    let indexed = entries.take(id, |stray| self.report_stray(stray));
                    self.compare_with_index(id, &state, indexed);
                }
            }
            entries.finish(|stray| self.report_stray(stray));
            Ok(())
        })
    }

    fn check_node(&self, cache: &Cache, id: u64) -> Result<NodeState> {
        let node = self
            .ctx
            .read(self.ctx.stores().nodes.as_ref(), RecordType::Node, id)?;
        if !node.in_use {
            return Ok(NodeState::NotInUse);
        }
        let mut flags = node_slot::IN_USE;
        if node.dense {
            flags |= node_slot::DENSE;
        }
        if node.next_rel != NULL_REFERENCE {
            flags |= node_slot::CHECK_MARK;
        }
        cache.put_reference(id, node_slot::NEXT_REL, node.next_rel);
        cache.put(id, node_slot::FLAGS, flags);

        let labels = read_labels(self.ctx, &node)?;
        if let Some(labels) = &labels {
            self.check_labels(id, labels)?;
        }
        let (values, ok) =
            SafePropertyChainReader::new(self.ctx).read(RecordType::Node, id, node.next_prop)?;
        if let (true, Some(labels)) = (ok, &labels) {
            self.compliance
                .check(EntityType::Node, id, &label_set(labels), &values)?;
        }
        Ok(NodeState::InUse(labels))
    }

    fn check_labels(&self, id: u64, labels: &[i64]) -> Result<()> {
        let reporter = self.ctx.reporter();
        let mut seen = FxHashSet::default();
        let mut previous: Option<i64> = None;
        for &label in labels {
            match self.ctx.token_use(TokenKind::Label, label)? {
                TokenUse::Valid => {}
                TokenUse::Illegal => {
                    reporter.report(RecordType::Node, id, Inconsistency::IllegalLabel { label })
                }
                TokenUse::NotInUse => {
                    reporter.report(RecordType::Node, id, Inconsistency::LabelNotInUse { label })
                }
            }
            if !seen.insert(label) {
                reporter.report(RecordType::Node, id, Inconsistency::LabelDuplicate { label });
            }
            if let Some(largest) = previous.filter(|&p| p > label) {
                reporter.report(
                    RecordType::Node,
                    id,
                    Inconsistency::LabelsOutOfOrder {
                        largest,
                        smallest: label,
                    },
                );
            }
            previous = Some(label);
        }
        Ok(())
    }

    fn compare_with_index(&self, id: u64, state: &NodeState, indexed: Option<Vec<i64>>) {
        let reporter = self.ctx.reporter();
        let labels = match state {
            NodeState::NotInUse => {
                if indexed.is_some() {
                    reporter.report(
                        RecordType::LabelScanDocument,
                        id,
                        Inconsistency::IndexedNodeNotInUse { node: id },
                    );
                }
                return;
            }
            NodeState::InUse(None) => return,
            NodeState::InUse(Some(labels)) => label_set(labels),
        };
        let indexed = indexed.unwrap_or_default();
        for &label in &labels {
            if indexed.binary_search(&label).is_err() {
                reporter.report(
                    RecordType::Node,
                    id,
                    Inconsistency::NodeLabelNotInIndex { label },
                );
            }
        }
        for &label in &indexed {
            if labels.binary_search(&label).is_err() {
                reporter.report(
                    RecordType::LabelScanDocument,
                    id,
                    Inconsistency::NodeDoesNotHaveExpectedLabel { label },
                );
            }
        }
    }

    fn report_stray(&self, node: u64) {
        self.ctx.reporter().report(
            RecordType::LabelScanDocument,
            node,
            Inconsistency::IndexedNodeNotInUse { node },
        );
    }
}
