use std::collections::HashMap;

pub type UserId = i64;

/// Static allow-list of operators: user id to display name.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    users: HashMap<UserId, String>,
}

impl AllowList {
    pub fn new(users: HashMap<UserId, String>) -> Self {
        Self { users }
    }

    pub fn is_allowed(&self, user: UserId) -> bool {
        self.users.contains_key(&user)
    }

    pub fn display_name(&self, user: UserId) -> String {
        self.users
            .get(&user)
            .cloned()
            .unwrap_or_else(|| user.to_string())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl FromIterator<(UserId, String)> for AllowList {
    fn from_iter<I: IntoIterator<Item = (UserId, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
