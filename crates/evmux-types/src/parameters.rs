use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-event key/value metadata.
///
/// Each key maps to a list of values of one of the supported types (`i32`,
/// `f32`, `String`). The same key may be used independently for each type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    ints: BTreeMap<String, Vec<i32>>,
    floats: BTreeMap<String, Vec<f32>>,
    strings: BTreeMap<String, Vec<String>>,
}

/// A value type that can be stored in [`Parameters`].
pub trait ParameterType: Sized + 'static + private::Sealed {
    #[doc(hidden)]
    fn map(params: &Parameters) -> &BTreeMap<String, Vec<Self>>;
    #[doc(hidden)]
    fn map_mut(params: &mut Parameters) -> &mut BTreeMap<String, Vec<Self>>;
}

mod private {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for String {}
}

impl ParameterType for i32 {
    fn map(params: &Parameters) -> &BTreeMap<String, Vec<Self>> {
        &params.ints
    }
    fn map_mut(params: &mut Parameters) -> &mut BTreeMap<String, Vec<Self>> {
        &mut params.ints
    }
}

impl ParameterType for f32 {
    fn map(params: &Parameters) -> &BTreeMap<String, Vec<Self>> {
        &params.floats
    }
    fn map_mut(params: &mut Parameters) -> &mut BTreeMap<String, Vec<Self>> {
        &mut params.floats
    }
}

impl ParameterType for String {
    fn map(params: &Parameters) -> &BTreeMap<String, Vec<Self>> {
        &params.strings
    }
    fn map_mut(params: &mut Parameters) -> &mut BTreeMap<String, Vec<Self>> {
        &mut params.strings
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a single value, replacing any previous values for `key`.
    pub fn set<T: ParameterType>(&mut self, key: impl Into<String>, value: T) {
        T::map_mut(self).insert(key.into(), vec![value]);
    }

    /// Store a list of values, replacing any previous values for `key`.
    pub fn set_all<T: ParameterType>(&mut self, key: impl Into<String>, values: Vec<T>) {
        T::map_mut(self).insert(key.into(), values);
    }

    /// First value stored under `key`.
    pub fn get<T: ParameterType>(&self, key: &str) -> Option<&T> {
        T::map(self).get(key).and_then(|v| v.first())
    }

    /// All values stored under `key`; empty if the key is unknown.
    pub fn get_all<T: ParameterType>(&self, key: &str) -> &[T] {
        T::map(self).get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Keys that hold values of type `T`, sorted.
    pub fn keys<T: ParameterType>(&self) -> Vec<&str> {
        T::map(self).keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.ints.len() + self.floats.len() + self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.ints.clear();
        self.floats.clear();
        self.strings.clear();
    }
}
