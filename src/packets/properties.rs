use super::validation::{PacketLimits, PacketResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserProperty {
    pub name: String,
    pub value: String,
}

impl UserProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered multimap of user properties as carried by a packet snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProperties(Vec<UserProperty>);

impl UserProperties {
    pub fn new(properties: Vec<UserProperty>) -> Self {
        Self(properties)
    }

    pub fn as_slice(&self) -> &[UserProperty] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn all_for_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

impl FromIterator<UserProperty> for UserProperties {
    fn from_iter<T: IntoIterator<Item = UserProperty>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Mutable user properties with their own modified flag.
#[derive(Debug, Clone)]
pub struct ModifiableUserProperties {
    properties: Vec<UserProperty>,
    limits: Arc<PacketLimits>,
    modified: bool,
}

impl ModifiableUserProperties {
    pub(crate) fn new(snapshot: &UserProperties, limits: Arc<PacketLimits>) -> Self {
        Self {
            properties: snapshot.0.clone(),
            limits,
            modified: false,
        }
    }

    pub fn add(&mut self, name: &str, value: &str) -> PacketResult<()> {
        self.limits.check_user_property(name, value)?;
        self.properties.push(UserProperty::new(name, value));
        self.modified = true;
        Ok(())
    }

    /// Removes every property matching both name and value.
    pub fn remove(&mut self, name: &str, value: &str) {
        let before = self.properties.len();
        self.properties
            .retain(|p| !(p.name == name && p.value == value));
        self.modified |= self.properties.len() != before;
    }

    /// Removes every property with the given name and returns the removed values.
    pub fn remove_name(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.properties.retain(|p| {
            if p.name == name {
                removed.push(p.value.clone());
                false
            } else {
                true
            }
        });
        self.modified |= !removed.is_empty();
        removed
    }

    pub fn clear(&mut self) {
        if !self.properties.is_empty() {
            self.properties.clear();
            self.modified = true;
        }
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn all_for_name(&self, name: &str) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.name == name)
            .map(|p| p.value.as_str())
            .collect()
    }

    pub fn as_slice(&self) -> &[UserProperty] {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn copy(&self) -> UserProperties {
        UserProperties(self.properties.clone())
    }
}
