#![allow(missing_docs)]

//! Conversion between two mutually recursive schemas with the same shape.

use sharepool::{
    Conversion, MigrationMap, PBox, PMap, PSet, PTable, PVector, PersistError, Sharepool,
    TypeCatalog,
};

mod model {
    use sharepool::{PBox, PMap, PSet, PTable, PVector, Persist, TableEntry};
    use std::hash::{Hash, Hasher};

    #[derive(Persist, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Key {
        pub name: String,
    }

    #[derive(Persist, Clone, Debug, PartialEq, Eq, Default)]
    pub struct ValueOne {
        pub twos: PVector<TwoBoxed>,
        pub twos_table: PTable<TwoBoxed>,
        pub twos_map: PMap<Key, TwoBoxed>,
        pub twos_set: PSet<TwoBoxed>,
    }

    #[derive(Persist, Clone, Debug, PartialEq, Eq)]
    pub struct ValueTwo {
        pub number: i64,
        pub ones: PVector<ValueOne>,
        pub key: Key,
    }

    #[derive(Persist, Clone, Debug, PartialEq, Eq)]
    pub struct TwoBoxed {
        pub two: PBox<ValueTwo>,
    }

    impl Hash for TwoBoxed {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.two.key.hash(state);
        }
    }

    impl TableEntry for TwoBoxed {
        type Key = Key;

        fn table_key(&self) -> &Key {
            &self.two.key
        }
    }
}

mod format {
    use sharepool::{PBox, PMap, PSet, PTable, PVector, Persist, TableEntry};
    use std::hash::{Hash, Hasher};

    #[derive(Persist, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Key {
        pub name: String,
    }

    #[derive(Persist, Clone, Debug, PartialEq, Eq, Default)]
    pub struct ValueOne {
        pub twos: PVector<TwoBoxed>,
        pub twos_table: PTable<TwoBoxed>,
        pub twos_map: PMap<Key, TwoBoxed>,
        pub twos_set: PSet<TwoBoxed>,
    }

    #[derive(Persist, Clone, Debug, PartialEq, Eq)]
    pub struct ValueTwo {
        pub number: i64,
        pub ones: PVector<ValueOne>,
        pub key: Key,
    }

    #[derive(Persist, Clone, Debug, PartialEq, Eq)]
    pub struct TwoBoxed {
        pub two: PBox<ValueTwo>,
    }

    impl Hash for TwoBoxed {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.two.key.hash(state);
        }
    }

    impl TableEntry for TwoBoxed {
        type Key = Key;

        fn table_key(&self) -> &Key {
            &self.two.key
        }
    }
}

// --- MIGRATION RULES ---

fn convert_key(key: &model::Key) -> format::Key {
    format::Key {
        name: key.name.clone(),
    }
}

fn convert_one(
    one: &model::ValueOne,
    conversion: &mut Conversion<'_>,
) -> sharepool::Result<format::ValueOne> {
    Ok(format::ValueOne {
        twos: conversion.convert_container(&one.twos)?,
        twos_table: conversion.convert_container(&one.twos_table)?,
        twos_map: conversion.convert_container(&one.twos_map)?,
        twos_set: conversion.convert_container(&one.twos_set)?,
    })
}

fn convert_two(
    two: &model::ValueTwo,
    conversion: &mut Conversion<'_>,
) -> sharepool::Result<format::ValueTwo> {
    Ok(format::ValueTwo {
        number: two.number,
        ones: conversion.convert_container(&two.ones)?,
        key: convert_key(&two.key),
    })
}

fn convert_boxed(
    boxed: &model::TwoBoxed,
    conversion: &mut Conversion<'_>,
) -> sharepool::Result<format::TwoBoxed> {
    Ok(format::TwoBoxed {
        two: conversion.convert_container(&boxed.two)?,
    })
}

fn element_rules() -> MigrationMap {
    MigrationMap::new()
        .convert::<PVector<model::TwoBoxed>, PVector<format::TwoBoxed>, _>(convert_boxed)
        .convert::<PTable<model::TwoBoxed>, PTable<format::TwoBoxed>, _>(convert_boxed)
        .convert::<PSet<model::TwoBoxed>, PSet<format::TwoBoxed>, _>(convert_boxed)
        .convert::<PMap<model::Key, model::TwoBoxed>, PMap<format::Key, format::TwoBoxed>, _>(
            |(key, value), conversion| Ok((convert_key(key), convert_boxed(value, conversion)?)),
        )
        .convert::<PVector<model::ValueOne>, PVector<format::ValueOne>, _>(convert_one)
}

fn migration() -> MigrationMap {
    element_rules().convert::<PBox<model::ValueTwo>, PBox<format::ValueTwo>, _>(convert_two)
}

fn corrupting_migration() -> MigrationMap {
    element_rules().convert::<PBox<model::ValueTwo>, PBox<format::ValueTwo>, _>(|two, conversion| {
        let mut converted = convert_two(two, conversion)?;
        converted.key.name = "qwe".to_owned();
        Ok(converted)
    })
}

// --- DATA ---

fn boxed(number: i64, key: &str, ones: PVector<model::ValueOne>) -> model::TwoBoxed {
    model::TwoBoxed {
        two: PBox::new(model::ValueTwo {
            number,
            ones,
            key: model::Key { name: key.to_owned() },
        }),
    }
}

fn one_of(twos: &[model::TwoBoxed]) -> model::ValueOne {
    model::ValueOne {
        twos: twos.iter().cloned().collect(),
        twos_table: twos.iter().cloned().collect(),
        twos_map: twos
            .iter()
            .map(|t| (t.two.key.clone(), t.clone()))
            .collect(),
        twos_set: twos.iter().cloned().collect(),
    }
}

/// `twos[0]` is also reachable as `twos[1].two.ones[0].twos[0]`.
fn sample() -> model::ValueOne {
    let leaves: Vec<model::TwoBoxed> = ["a", "b", "c", "d", "e", "f"]
        .iter()
        .enumerate()
        .map(|(i, key)| boxed(i as i64, key, PVector::new()))
        .collect();
    let inner = one_of(&leaves);
    let outer = boxed(100, "outer", PVector::new().push_back(inner));
    let mut twos = vec![leaves[0].clone(), outer];
    twos.extend(leaves[1..].iter().cloned());
    one_of(&twos)
}

// --- TESTS ---

#[test]
fn circular_schemas_convert_with_sharing() -> sharepool::Result<()> {
    let value = sample();
    let catalog = TypeCatalog::discover::<model::ValueOne>();
    let pools = Sharepool::get_pools(&value, &catalog)?;
    let map = migration();

    let mut conversion = Conversion::new(&pools, &map);
    let twos: PVector<format::TwoBoxed> = conversion.convert_container(&value.twos)?;
    assert_eq!(twos.len(), value.twos.len());

    let direct = twos.get(0).expect("first element").two.clone();
    let nested = twos
        .get(1)
        .and_then(|outer| outer.two.ones.get(0))
        .and_then(|one| one.twos.get(0))
        .map(|t| t.two.clone())
        .expect("nested element");
    assert!(direct.ptr_eq(&nested));
    assert_eq!(direct.key.name, "a");
    Ok(())
}

#[test]
fn converting_twice_returns_the_same_roots() -> sharepool::Result<()> {
    let value = sample();
    let catalog = TypeCatalog::discover::<model::ValueOne>();
    let pools = Sharepool::get_pools(&value, &catalog)?;
    let map = migration();

    let mut conversion = Conversion::new(&pools, &map);
    let first = convert_one(&value, &mut conversion)?;
    let second = convert_one(&value, &mut conversion)?;
    assert!(first.twos.ptr_eq(&second.twos));
    assert!(first.twos_table.ptr_eq(&second.twos_table));
    assert!(first.twos_map.ptr_eq(&second.twos_map));
    assert!(first.twos_set.ptr_eq(&second.twos_set));
    Ok(())
}

#[test]
fn converted_value_saves_like_the_source() -> sharepool::Result<()> {
    let value = sample();
    let model_catalog = TypeCatalog::discover::<model::ValueOne>();
    let format_catalog = TypeCatalog::discover::<format::ValueOne>();
    let (model_bytes, pools) = Sharepool::save(&value, &model_catalog)?;

    let map = migration();
    let mut conversion = Conversion::new(&pools, &map);
    let converted = convert_one(&value, &mut conversion)?;
    let (format_bytes, _) = Sharepool::save(&converted, &format_catalog)?;

    assert_eq!(
        String::from_utf8_lossy(&model_bytes),
        String::from_utf8_lossy(&format_bytes)
    );
    Ok(())
}

#[test]
fn key_corrupting_rule_fails_hash_validation() -> sharepool::Result<()> {
    let value = sample();
    let catalog = TypeCatalog::discover::<model::ValueOne>();
    let pools = Sharepool::get_pools(&value, &catalog)?;
    let map = corrupting_migration();

    let mut conversion = Conversion::new(&pools, &map);
    let result: sharepool::Result<PVector<format::TwoBoxed>> =
        conversion.convert_container(&value.twos);
    assert!(matches!(result, Err(PersistError::HashValidationFailed(_))));
    Ok(())
}

#[test]
fn disabled_validation_lets_corrupt_tries_through() -> sharepool::Result<()> {
    let value = sample();
    let catalog = TypeCatalog::discover::<model::ValueOne>();
    let pools = Sharepool::get_pools(&value, &catalog)?;
    let map = corrupting_migration();

    let converted: PTable<format::TwoBoxed> = Sharepool::builder()
        .validate_hashes(false)
        .convert(&pools, &map, &value.twos_table)?;
    assert_eq!(converted.len(), value.twos_table.len());
    assert!(converted.iter().all(|t| t.two.key.name == "qwe"));
    Ok(())
}

#[test]
fn load_with_conversion_matches_direct_conversion() -> sharepool::Result<()> {
    let value = sample();
    let model_catalog = TypeCatalog::discover::<model::ValueOne>();
    let (bytes, pools) = Sharepool::save(&value, &model_catalog)?;

    let map = migration();
    let loaded: format::ValueOne = Sharepool::load_with_conversion(&bytes, &model_catalog, &map)?;
    let mut conversion = Conversion::new(&pools, &map);
    let direct = convert_one(&value, &mut conversion)?;
    assert_eq!(loaded, direct);

    let first = loaded.twos.get(0).expect("first element").two.clone();
    let nested = loaded
        .twos
        .get(1)
        .and_then(|outer| outer.two.ones.get(0))
        .and_then(|one| one.twos.get(0))
        .map(|t| t.two.clone())
        .expect("nested element");
    assert!(first.ptr_eq(&nested));
    Ok(())
}

#[test]
fn load_with_corrupting_conversion_fails() -> sharepool::Result<()> {
    let value = sample();
    let catalog = TypeCatalog::discover::<model::ValueOne>();
    let (bytes, _) = Sharepool::save(&value, &catalog)?;

    let migration = corrupting_migration();
    let result = Sharepool::load_with_conversion::<format::ValueOne>(&bytes, &catalog, &migration);
    assert!(matches!(result, Err(PersistError::HashValidationFailed(_))));
    Ok(())
}

#[test]
fn missing_rules_are_unmapped_types() -> sharepool::Result<()> {
    let value = sample();
    let catalog = TypeCatalog::discover::<model::ValueOne>();
    let pools = Sharepool::get_pools(&value, &catalog)?;

    let empty = MigrationMap::new();
    let result: sharepool::Result<PVector<format::TwoBoxed>> =
        Sharepool::convert(&pools, &empty, &value.twos);
    assert!(matches!(result, Err(PersistError::UnmappedType(_))));

    let wrong_target: sharepool::Result<PVector<model::TwoBoxed>> =
        Sharepool::convert(&pools, &migration(), &value.twos);
    assert!(matches!(wrong_target, Err(PersistError::UnmappedType(_))));
    Ok(())
}

#[test]
fn placeholders_stand_in_for_empty_containers() -> sharepool::Result<()> {
    let empty: PVector<u32> = PVector::new();
    let full: PVector<u32> = (0..20).collect();
    let catalog = TypeCatalog::discover::<(PVector<u32>, PVector<u32>)>();
    let pools = Sharepool::get_pools(&(empty.clone(), full.clone()), &catalog)?;

    let placeholder = PVector::new().push_back("empty".to_owned());
    let expected = placeholder.clone();
    let only_placeholder = MigrationMap::new()
        .placeholder::<PVector<u32>, PVector<String>, _>(move || placeholder.clone());

    let converted: PVector<String> = Sharepool::convert(&pools, &only_placeholder, &empty)?;
    assert!(converted.ptr_eq(&expected));

    let result: sharepool::Result<PVector<String>> =
        Sharepool::convert(&pools, &only_placeholder, &full);
    assert!(matches!(result, Err(PersistError::UnmappedType(_))));

    let both = only_placeholder
        .convert::<PVector<u32>, PVector<String>, _>(|n, _| Ok(n.to_string()));
    let converted: PVector<String> = Sharepool::convert(&pools, &both, &full)?;
    assert_eq!(converted.get(19).map(String::as_str), Some("19"));
    Ok(())
}

#[test]
fn containers_outside_the_source_are_rejected() -> sharepool::Result<()> {
    let saved: PVector<u32> = (0..4).collect();
    let pools = Sharepool::get_pools(&saved, &TypeCatalog::discover::<PVector<u32>>())?;
    let map = MigrationMap::new()
        .convert::<PVector<u32>, PVector<u64>, _>(|n, _| Ok(u64::from(*n)));

    let stranger: PVector<u32> = (0..4).collect();
    let result: sharepool::Result<PVector<u64>> = Sharepool::convert(&pools, &map, &stranger);
    assert!(matches!(result, Err(PersistError::Format(_))));
    Ok(())
}
