pub use ecow::EcoString as LifeStr;

pub static LSTR_EMPTY: LifeStr = LifeStr::new();

pub trait PathExt {
    /// Append a field segment to a dotted access path (`p` + `age` -> `p.age`).
    fn join_field(&self, field: &str) -> LifeStr;
}

impl PathExt for LifeStr {
    fn join_field(&self, field: &str) -> LifeStr {
        if self.is_empty() {
            return field.into();
        }
        let mut path = self.clone();
        path.push('.');
        path.push_str(field);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_field() {
        let root = LifeStr::from("p");
        assert_eq!(root.join_field("age").as_str(), "p.age");
        assert_eq!(root.join_field("age").join_field("years").as_str(), "p.age.years");
        assert_eq!(LSTR_EMPTY.join_field("x").as_str(), "x");
    }

    #[test]
    fn test_lstr_as_hash_key() {
        use std::collections::HashMap;

        let mut map: HashMap<LifeStr, i32> = HashMap::new();
        map.insert(LifeStr::from("key"), 1);
        assert_eq!(map.get("key"), Some(&1));
    }
}
