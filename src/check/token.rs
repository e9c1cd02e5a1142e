use super::CheckContext;
use crate::access::read_dynamic_chain;
use crate::report::{Inconsistency, InconsistencyKind, RecordType};
use crate::store::{Result, TokenRecord};
use crate::types::{is_none, TokenKind};

/// Checks one token record and the name it points at.
pub fn check(ctx: &CheckContext<'_>, kind: TokenKind, token: &TokenRecord) -> Result<()> {
    if !token.in_use {
        return Ok(());
    }
    let record_type = RecordType::of_token(kind);
    let store = kind.name_store();
    if is_none(token.name_id) {
        ctx.report(Inconsistency::new(
            record_type,
            token.id,
            InconsistencyKind::ReferenceNotInUse,
            "name_id",
            format!("in-use {store} record"),
            "none",
        ));
        return Ok(());
    }
    if !ctx.check_dynamic_head(record_type, token.id, "name_id", store, token.name_id)? {
        return Ok(());
    }
    ctx.claim_dynamic(store, token.name_id, record_type);
    // Broken name chains are reported by the name store's own sweep.
    if let Some(name) = read_dynamic_chain(ctx.access, store, token.name_id)? {
        if std::str::from_utf8(&name).is_err() {
            ctx.report(Inconsistency::new(
                record_type,
                token.id,
                InconsistencyKind::UndecodablePayload,
                "name",
                "UTF-8 name",
                format!("{} bytes", name.len()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::testing::run_checks;
    use crate::check::RecordCheck;
    use crate::store::builder::StoreBuilder;
    use crate::types::DynamicStore;

    fn labels() -> RecordCheck {
        RecordCheck::Token(TokenKind::Label)
    }

    #[test]
    fn named_tokens_pass() {
        let summary = run_checks(&StoreBuilder::demo(), &[labels()], true);
        assert_eq!(summary.total(), 0, "{:?}", summary.findings);
    }

    #[test]
    fn freed_name_record_is_reported() {
        let mut b = StoreBuilder::new();
        b.add_label("Person");
        b.dynamic_mut(DynamicStore::LabelName, 0).unwrap().in_use = false;
        let summary = run_checks(&b, &[labels()], false);
        assert_eq!(summary.count(RecordType::Label), 1);
        assert_eq!(summary.findings[0].field, "name_id");
    }

    #[test]
    fn two_tokens_sharing_a_name() {
        let mut b = StoreBuilder::new();
        b.add_label("A");
        b.add_label("B");
        b.token_mut(TokenKind::Label, 1).unwrap().name_id = 0;
        let summary = run_checks(&b, &[labels()], true);
        assert_eq!(summary.kind_count(InconsistencyKind::MultipleOwners), 1);
        assert_eq!(summary.count(RecordType::LabelName), 1);
    }

    #[test]
    fn invalid_utf8_name() {
        let mut b = StoreBuilder::new();
        b.add_label("ok");
        b.dynamic_mut(DynamicStore::LabelName, 0).unwrap().data = vec![0xff, 0xfe];
        let summary = run_checks(&b, &[labels()], false);
        assert_eq!(summary.kind_count(InconsistencyKind::UndecodablePayload), 1);
    }
}
