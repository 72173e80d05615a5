#![allow(missing_docs)]

use serde_json::Value;
use sharepool::{
    InputPools, PMap, PSet, PTable, PVector, Persist, PersistError, PoolInspector, Sharepool,
    TableEntry, TypeCatalog,
};

#[derive(Persist, Clone, Debug, PartialEq)]
struct Account {
    id: u64,
    owner: String,
}

impl TableEntry for Account {
    type Key = u64;

    fn table_key(&self) -> &u64 {
        &self.id
    }
}

#[derive(Persist, Clone, Debug, PartialEq)]
struct Ledger {
    title: String,
    accounts: PTable<Account>,
    balances: PMap<u64, i64>,
    audited: PSet<u64>,
    journal: PVector<String>,
}

fn create_ledger() -> Ledger {
    let accounts: PTable<Account> = (0..40)
        .map(|id| Account {
            id,
            owner: format!("owner-{id}"),
        })
        .collect();
    Ledger {
        title: "Integration Test".to_string(),
        balances: (0..40).map(|id| (id, id as i64 * 10)).collect(),
        audited: (0..40).filter(|id| id % 3 == 0).collect(),
        journal: (0..200).map(|n| format!("entry {n}")).collect(),
        accounts,
    }
}

/// Rewrites every inline value of every hash trie record in the pool `pool`.
fn tamper_trie_values(bytes: &[u8], pool: &str, replacement: Value) -> Vec<u8> {
    let mut doc: Value = serde_json::from_slice(bytes).expect("valid archive");
    let nodes = doc["pools"][pool]["nodes"]
        .as_array_mut()
        .expect("pool has nodes");
    for node in nodes {
        let values = node
            .get_mut("inner")
            .and_then(|inner| inner.get_mut("values"))
            .and_then(Value::as_array_mut);
        if let Some(values) = values {
            for value in values {
                *value = replacement.clone();
            }
        }
    }
    serde_json::to_vec(&doc).expect("encodable")
}

// --- TESTS ---

/// Standard File IO
/// Validate `Sharepool::save_file`, `Sharepool::load_file`
#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_standard_file_io() -> sharepool::Result<()> {
    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("ledger.json");
    let data = create_ledger();
    let catalog = TypeCatalog::discover::<Ledger>();

    Sharepool::save_file(&file_path, &data, &catalog)?;
    let loaded: Ledger = Sharepool::load_file(&file_path, &catalog)?;

    assert_eq!(data, loaded);
    Ok(())
}

/// Missing files surface as I/O errors, not decode errors.
#[test]
fn test_missing_file() -> sharepool::Result<()> {
    let dir = tempfile::tempdir()?;
    let catalog = TypeCatalog::discover::<Ledger>();
    let result = Sharepool::load_file::<Ledger, _>(dir.path().join("absent.json"), &catalog);
    assert!(matches!(result, Err(PersistError::Io(_))));
    Ok(())
}

/// Pure Memory IO
/// Validate `Sharepool::save`, `Sharepool::load` and the pool names in the output
#[test]
fn test_memory_io() -> sharepool::Result<()> {
    let data = create_ledger();
    let catalog = TypeCatalog::discover::<Ledger>();
    let (bytes, pools) = Sharepool::save(&data, &catalog)?;
    assert!(pools.total_nodes() > 0);

    let doc: Value = serde_json::from_slice(&bytes)?;
    let names: Vec<&str> = doc["pools"]
        .as_object()
        .map(|p| p.keys().map(String::as_str).collect())
        .unwrap_or_default();
    assert_eq!(names, ["accounts", "audited", "balances", "journal"]);
    assert_eq!(doc["value0"]["title"], "Integration Test");

    let loaded: Ledger = Sharepool::load(&bytes, &catalog)?;
    assert_eq!(data, loaded);
    assert_eq!(loaded.accounts.get(&7).map(|a| a.owner.as_str()), Some("owner-7"));
    Ok(())
}

/// Pretty output decodes to the same value.
#[test]
fn test_pretty_output() -> sharepool::Result<()> {
    let data = create_ledger();
    let catalog = TypeCatalog::discover::<Ledger>();
    let (compact, _) = Sharepool::save(&data, &catalog)?;
    let (pretty, _) = Sharepool::builder().pretty(true).save(&data, &catalog)?;
    assert!(pretty.len() > compact.len());
    assert_eq!(Sharepool::load::<Ledger>(&pretty, &catalog)?, data);
    Ok(())
}

#[test]
fn test_malformed_input() {
    let catalog = TypeCatalog::discover::<Ledger>();
    let result = Sharepool::load::<Ledger>(b"not json", &catalog);
    assert!(matches!(result, Err(PersistError::Decode(_))));

    let result = Sharepool::load::<Ledger>(br#"{"value0": {"title": 3}}"#, &catalog);
    assert!(matches!(result, Err(PersistError::Decode(_))));
}

#[test]
fn test_dangling_and_unknown_references() -> sharepool::Result<()> {
    let catalog = TypeCatalog::discover::<PVector<u8>>();
    let (bytes, _) = Sharepool::save(&PVector::<u8>::new().push_back(1), &catalog)?;

    let mut doc: Value = serde_json::from_slice(&bytes)?;
    doc["value0"] = Value::from(99);
    let dangling = serde_json::to_vec(&doc)?;
    let result = Sharepool::load::<PVector<u8>>(&dangling, &catalog);
    assert!(matches!(result, Err(PersistError::Format(_))));

    let result = Sharepool::load::<PVector<u16>>(&bytes, &catalog);
    assert!(matches!(result, Err(PersistError::UnknownPool(_))));
    Ok(())
}

#[test]
fn test_tampered_trie_fails_validation() -> sharepool::Result<()> {
    let catalog = TypeCatalog::discover::<Ledger>();
    let (bytes, _) = Sharepool::save(&create_ledger(), &catalog)?;
    let tampered = tamper_trie_values(&bytes, "audited", Value::from(12_345));

    let result = Sharepool::load::<Ledger>(&tampered, &catalog);
    assert!(matches!(result, Err(PersistError::HashValidationFailed(_))));

    let loaded: Ledger = Sharepool::builder()
        .validate_hashes(false)
        .load(&tampered, &catalog)?;
    assert_eq!(loaded.audited.len(), create_ledger().audited.len());
    Ok(())
}

#[test]
fn test_ignore_pool_exceptions_on_input_pools() -> sharepool::Result<()> {
    let catalog = TypeCatalog::discover::<Ledger>();
    let (bytes, _) = Sharepool::save(&create_ledger(), &catalog)?;
    let tampered = tamper_trie_values(&bytes, "balances", serde_json::json!([1, 1]));

    let (mut pools, value0) = InputPools::from_bytes(&tampered, catalog.clone())?;
    assert!(!pools.ignore_pool_exceptions());
    assert!(matches!(
        Ledger::load(&value0, &mut pools),
        Err(PersistError::HashValidationFailed(_))
    ));

    let (mut pools, value0) = InputPools::from_bytes(&tampered, catalog)?;
    pools.set_ignore_pool_exceptions(true);
    let loaded = Ledger::load(&value0, &mut pools)?;
    assert_eq!(loaded.balances.len(), 40);
    Ok(())
}

#[test]
fn test_plain_serde_duplicates() {
    let set: Result<PSet<u8>, _> = serde_json::from_str("[1, 2, 2]");
    assert!(set.is_err());
    let map: Result<PMap<String, u8>, _> = serde_json::from_str(r#"{"a": 1, "b": 2}"#);
    assert_eq!(map.ok().map(|m| m.len()), Some(2));

    let result = PSet::from_elements([1u8, 2, 2], 3);
    assert!(matches!(result, Err(PersistError::DuplicateKeyOnLoad(_))));
}

#[test]
fn test_inspector_report() -> sharepool::Result<()> {
    let catalog = TypeCatalog::discover::<Ledger>();
    let (bytes, _) = Sharepool::save(&create_ledger(), &catalog)?;
    let report = PoolInspector::inspect_bytes(&bytes)?;

    let journal = report
        .pools
        .iter()
        .find(|p| p.name == "journal")
        .expect("journal pool");
    assert!(journal.leaves > 0);
    assert!(journal.branches > 0);
    assert_eq!(journal.trie_nodes, 0);

    let accounts = report
        .pools
        .iter()
        .find(|p| p.name == "accounts")
        .expect("accounts pool");
    assert!(accounts.trie_nodes > 0);
    assert_eq!(accounts.leaves, 0);

    let text = report.to_string();
    assert!(text.contains("[journal]"));
    Ok(())
}
