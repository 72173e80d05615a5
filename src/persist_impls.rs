//! `Persist` for standard types.
//!
//! Scalars are written with plain serde. `Option`, `Vec`, `Box` and pairs are composites:
//! they persist their contents through [`Persist`], so containers nested inside them still
//! go to their pools, and they report their contents to type discovery.
//!
//! `None` is written as `null` and `Some(v)` as the one-element array `[v]`, so nested
//! options and values that save as `null` keep their shape.

use crate::catalog::Members;
use crate::persist::Persist;
use crate::pool::{InputPools, OutputPools};
use crate::{PersistError, Result};
use serde_json::Value;

macro_rules! impl_scalar_persist {
    ($($t:ty),*) => {
        $(
            impl Persist for $t {
                fn save(&self, _pools: &mut OutputPools) -> Result<Value> {
                    Ok(serde_json::to_value(self)?)
                }

                fn load(node: &Value, _pools: &mut InputPools) -> Result<Self> {
                    Ok(<$t as serde::Deserialize>::deserialize(node)?)
                }
            }
        )*
    };
}

impl_scalar_persist!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char, String,
    ()
);

impl<T: Persist> Persist for Option<T> {
    fn save(&self, pools: &mut OutputPools) -> Result<Value> {
        match self {
            Some(value) => Ok(Value::Array(vec![value.save(pools)?])),
            None => Ok(Value::Null),
        }
    }

    fn load(node: &Value, pools: &mut InputPools) -> Result<Self> {
        match node {
            Value::Null => Ok(None),
            Value::Array(items) if items.len() == 1 => T::load(&items[0], pools).map(Some),
            other => Err(PersistError::Decode(format!(
                "expected null or a one-element array, found {other}"
            ))),
        }
    }

    fn members(members: &mut Members) {
        members.element::<T>();
    }
}

impl<T: Persist> Persist for Vec<T> {
    fn save(&self, pools: &mut OutputPools) -> Result<Value> {
        self.iter()
            .map(|item| item.save(pools))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn load(node: &Value, pools: &mut InputPools) -> Result<Self> {
        let items = node
            .as_array()
            .ok_or_else(|| PersistError::Decode(format!("expected an array, found {node}")))?;
        items.iter().map(|item| T::load(item, pools)).collect()
    }

    fn members(members: &mut Members) {
        members.element::<T>();
    }
}

impl<T: Persist> Persist for Box<T> {
    fn save(&self, pools: &mut OutputPools) -> Result<Value> {
        (**self).save(pools)
    }

    fn load(node: &Value, pools: &mut InputPools) -> Result<Self> {
        T::load(node, pools).map(Box::new)
    }

    fn members(members: &mut Members) {
        members.element::<T>();
    }
}

impl<A: Persist, B: Persist> Persist for (A, B) {
    fn save(&self, pools: &mut OutputPools) -> Result<Value> {
        Ok(Value::Array(vec![self.0.save(pools)?, self.1.save(pools)?]))
    }

    fn load(node: &Value, pools: &mut InputPools) -> Result<Self> {
        match node.as_array().map(Vec::as_slice) {
            Some([a, b]) => Ok((A::load(a, pools)?, B::load(b, pools)?)),
            _ => Err(PersistError::Decode(format!("expected a pair, found {node}"))),
        }
    }

    fn members(members: &mut Members) {
        members.element::<A>();
        members.element::<B>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PVector, TypeCatalog};
    use serde_json::json;

    #[test]
    fn composites_reach_nested_containers() {
        let catalog = TypeCatalog::discover::<Vec<Option<(u8, PVector<i32>)>>>();
        assert!(catalog.contains::<PVector<i32>>());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn scalars_use_plain_json() -> crate::Result<()> {
        let mut out = OutputPools::new(TypeCatalog::new());
        assert_eq!((7u8, "x".to_owned()).save(&mut out)?, json!([7, "x"]));
        assert_eq!(Some(1.5f64).save(&mut out)?, json!([1.5]));
        assert_eq!(None::<u8>.save(&mut out)?, Value::Null);

        let mut input = InputPools::new(TypeCatalog::new());
        let pair = <(u8, String)>::load(&json!([7, "x"]), &mut input)?;
        assert_eq!(pair, (7, "x".to_owned()));
        assert!(<(u8, u8)>::load(&json!([1]), &mut input).is_err());
        assert!(u8::load(&json!(300), &mut input).is_err());
        Ok(())
    }

    #[test]
    fn nested_options_keep_their_shape() -> crate::Result<()> {
        let mut out = OutputPools::new(TypeCatalog::new());
        let mut input = InputPools::new(TypeCatalog::new());
        let cases = [None, Some(None), Some(Some(4u8))];
        for case in cases {
            let saved = case.save(&mut out)?;
            assert_eq!(Option::<Option<u8>>::load(&saved, &mut input)?, case);
        }
        assert_eq!(Some(None::<u8>).save(&mut out)?, json!([null]));

        let unit = Some(()).save(&mut out)?;
        assert_eq!(Option::<()>::load(&unit, &mut input)?, Some(()));
        assert!(Option::<u8>::load(&json!(4), &mut input).is_err());
        assert!(Option::<u8>::load(&json!([1, 2]), &mut input).is_err());
        Ok(())
    }
}
