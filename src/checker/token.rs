//! Token records, their name chains, and token validity for graph entities.

use super::dynamic::{read_chain, ChainRead};
use super::{CheckerContext, IdRange};
use crate::error::Result;
use crate::report::{Inconsistency, RecordType};
use crate::store::{decode_string, reference, RecordStore, TokenStores};
use crate::token::TokenHolder;

/// Kind of token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Label,
    RelationshipType,
    PropertyKey,
}

impl TokenKind {
    const ALL: [TokenKind; 3] = [
        TokenKind::Label,
        TokenKind::RelationshipType,
        TokenKind::PropertyKey,
    ];

    fn stores(self, ctx: &CheckerContext) -> &TokenStores {
        let stores = ctx.stores();
        match self {
            TokenKind::Label => &stores.labels,
            TokenKind::RelationshipType => &stores.relationship_types,
            TokenKind::PropertyKey => &stores.property_keys,
        }
    }

    fn holder(self, ctx: &CheckerContext) -> &TokenHolder {
        let tokens = ctx.tokens();
        match self {
            TokenKind::Label => &tokens.labels,
            TokenKind::RelationshipType => &tokens.relationship_types,
            TokenKind::PropertyKey => &tokens.property_keys,
        }
    }

    fn record_type(self) -> RecordType {
        match self {
            TokenKind::Label => RecordType::LabelToken,
            TokenKind::RelationshipType => RecordType::RelationshipTypeToken,
            TokenKind::PropertyKey => RecordType::PropertyKeyToken,
        }
    }

    fn name_record_type(self) -> RecordType {
        match self {
            TokenKind::Label => RecordType::LabelTokenName,
            TokenKind::RelationshipType => RecordType::RelationshipTypeTokenName,
            TokenKind::PropertyKey => RecordType::PropertyKeyTokenName,
        }
    }
}

/// How an entity's token reference resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TokenUse {
    Valid,
    Illegal,
    NotInUse,
}

impl CheckerContext {
    /// Resolves a token reference. Internal tokens count as not in use.
    pub(crate) fn token_use(&self, kind: TokenKind, id: i64) -> Result<TokenUse> {
        let Some(token_id) = reference(id) else {
            return Ok(TokenUse::Illegal);
        };
        if kind.holder(self).contains(id) {
            return Ok(TokenUse::Valid);
        }
        let token = self.lookup(kind.stores(self).tokens.as_ref(), token_id)?;
        Ok(if token.in_use && !token.internal {
            TokenUse::Valid
        } else {
            TokenUse::NotInUse
        })
    }
}

/// Checks every in-use token's name chain.
pub(crate) struct TokenChecker<'a> {
    ctx: &'a CheckerContext,
}

impl<'a> TokenChecker<'a> {
    pub(crate) fn new(ctx: &'a CheckerContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn check(&self) -> Result<()> {
        for kind in TokenKind::ALL {
            let high_id = kind.stores(self.ctx).tokens.high_id();
            let stage = match kind {
                TokenKind::Label => "label tokens",
                TokenKind::RelationshipType => "relationship type tokens",
                TokenKind::PropertyKey => "property key tokens",
            };
            self.ctx
                .execution()
                .run(stage, IdRange::new(0, high_id), |chunk| {
                    for id in chunk.range.start..chunk.range.end {
                        self.check_token(kind, id)?;
                    }
                    Ok(())
                })?;
        }
        Ok(())
    }

    fn check_token(&self, kind: TokenKind, id: u64) -> Result<()> {
        let stores = kind.stores(self.ctx);
        let token = self
            .ctx
            .read(stores.tokens.as_ref(), kind.record_type(), id)?;
        if !token.in_use {
            return Ok(());
        }
        let reporter = self.ctx.reporter();
        let Some(first) = reference(token.name_id) else {
            reporter.report(
                kind.record_type(),
                id,
                Inconsistency::NameBlockNotInUse {
                    record: token.name_id,
                },
            );
            return Ok(());
        };
        match read_chain(
            self.ctx,
            stores.names.as_ref(),
            kind.name_record_type(),
            first,
        )? {
            ChainRead::FirstNotInUse => reporter.report(
                kind.record_type(),
                id,
                Inconsistency::NameBlockNotInUse {
                    record: token.name_id,
                },
            ),
            ChainRead::Read { bytes, .. } => match decode_string(&bytes) {
                Ok(name) if name.is_empty() => {
                    reporter.report(kind.record_type(), id, Inconsistency::EmptyName)
                }
                Ok(_) => {}
                Err(err) => reporter.report(
                    kind.record_type(),
                    id,
                    Inconsistency::InvalidPropertyValue {
                        detail: err.to_string(),
                    },
                ),
            },
        }
        Ok(())
    }
}
