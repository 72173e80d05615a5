#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use sharepool::{ContainerKind, PBox, PMap, PSet, PVector, Persist, Sharepool, TypeCatalog};

#[derive(Serialize, Deserialize, Persist, Clone, Debug, PartialEq)]
struct Settings {
    depth: u8,
    flags: PVector<bool>,
}

#[derive(Persist, Clone, Debug, PartialEq)]
struct Node {
    id: u32,
    children: PVector<PBox<Node>>,
    #[persist(rename = "labels")]
    names: PSet<String>,
    #[persist(inline)]
    settings: Settings,
    lookup: Option<PMap<u32, String>>,
}

#[derive(Persist, Debug, PartialEq)]
struct Wrapper<T> {
    inner: T,
}

#[derive(Persist, Debug, PartialEq)]
struct Empty {}

#[derive(Persist, Clone, Debug, PartialEq)]
struct Slots {
    maybe: Option<Option<u8>>,
    boxed: Option<Option<PVector<u8>>>,
}

fn leaf(id: u32) -> Node {
    Node {
        id,
        children: PVector::new(),
        names: PSet::new().insert(format!("node-{id}")),
        settings: Settings {
            depth: 1,
            flags: PVector::new().push_back(true),
        },
        lookup: None,
    }
}

#[test]
fn discovery_finds_every_pooled_container() {
    let catalog = TypeCatalog::discover::<Node>();
    let names: Vec<&str> = catalog.names().collect();
    assert!(names.contains(&"children"));
    assert!(names.contains(&"labels"));
    assert!(names.contains(&"lookup"));
    assert_eq!(
        catalog.get::<PBox<Node>>().map(|p| p.name.as_str()),
        Some(std::any::type_name::<PBox<Node>>())
    );
    assert_eq!(
        catalog.get::<PSet<String>>().map(|p| p.kind),
        Some(ContainerKind::HashTrie)
    );
}

#[test]
fn inline_fields_are_not_discovered() {
    let catalog = TypeCatalog::discover::<Node>();
    assert!(!catalog.contains::<PVector<bool>>());
    assert_eq!(catalog.len(), 4);
}

#[test]
fn recursive_structs_round_trip() -> sharepool::Result<()> {
    let root = Node {
        children: PVector::new()
            .push_back(PBox::new(leaf(1)))
            .push_back(PBox::new(leaf(2))),
        lookup: Some(PMap::new().insert(1, "one".into())),
        ..leaf(0)
    };
    let catalog = TypeCatalog::discover::<Node>();
    let (bytes, _) = Sharepool::save(&root, &catalog)?;
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("\"labels\""));
    assert!(text.contains("\"settings\":{\"depth\":1,\"flags\":[true]}"));

    let loaded: Node = Sharepool::load(&bytes, &catalog)?;
    assert_eq!(loaded, root);
    Ok(())
}

#[test]
fn generic_and_empty_structs_derive() -> sharepool::Result<()> {
    let value = Wrapper {
        inner: PVector::new().push_back(3u16),
    };
    let catalog = TypeCatalog::discover::<Wrapper<PVector<u16>>>();
    assert!(catalog.contains::<PVector<u16>>());
    let (bytes, _) = Sharepool::save(&value, &catalog)?;
    assert_eq!(Sharepool::load::<Wrapper<PVector<u16>>>(&bytes, &catalog)?, value);

    let catalog = TypeCatalog::discover::<Empty>();
    assert!(catalog.is_empty());
    let (bytes, _) = Sharepool::save(&Empty {}, &catalog)?;
    assert_eq!(Sharepool::load::<Empty>(&bytes, &catalog)?, Empty {});
    Ok(())
}

#[test]
fn missing_fields_are_decode_errors() {
    let catalog = TypeCatalog::discover::<Empty>();
    let bytes = br#"{"value0": {"inner": 1}, "pools": {}}"#;
    let result = Sharepool::load::<Wrapper<u8>>(bytes, &catalog);
    assert!(result.is_ok());
    let bytes = br#"{"value0": {}, "pools": {}}"#;
    let result = Sharepool::load::<Wrapper<u8>>(bytes, &catalog);
    assert!(matches!(result, Err(sharepool::PersistError::Decode(_))));
}

#[test]
fn nested_options_round_trip() -> sharepool::Result<()> {
    let catalog = TypeCatalog::discover::<Slots>();
    let values = [
        Slots {
            maybe: Some(None),
            boxed: Some(None),
        },
        Slots {
            maybe: None,
            boxed: None,
        },
        Slots {
            maybe: Some(Some(9)),
            boxed: Some(Some(PVector::new().push_back(1))),
        },
    ];
    for value in values {
        let (bytes, _) = Sharepool::save(&value, &catalog)?;
        assert_eq!(Sharepool::load::<Slots>(&bytes, &catalog)?, value);
    }
    Ok(())
}
