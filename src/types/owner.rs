//! Repository owners.
//!
//! A repository belongs either to an organization or to a user account. The
//! two are stored in separate maps; [`OwnerRef`] is the link a repository
//! carries and [`Owner`] is the resolved account returned to readers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entities::{Organization, Repository, User};
use super::field::Field;
use super::ids::{OrgId, RepoId, UserId};

/// Reference to the account that owns a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerRef {
    Organization(OrgId),
    User(UserId),
}

impl OwnerRef {
    /// Builds a reference from GitHub's `owner.type` string.
    ///
    /// GitHub reports `"Organization"` for organizations and `"User"` (or
    /// `"Bot"`) for personal accounts.
    pub fn from_account_type(account_type: &str, id: u64) -> Self {
        if account_type.eq_ignore_ascii_case("organization") {
            OwnerRef::Organization(OrgId(id))
        } else {
            OwnerRef::User(UserId(id))
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerRef::Organization(id) => write!(f, "org:{}", id),
            OwnerRef::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// A resolved repository owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Owner {
    Organization(Organization),
    User(User),
}

impl Owner {
    pub fn id(&self) -> OwnerRef {
        match self {
            Owner::Organization(org) => OwnerRef::Organization(org.id),
            Owner::User(user) => OwnerRef::User(user.id),
        }
    }

    pub fn login(&self) -> Option<&str> {
        let login: &Field<String> = match self {
            Owner::Organization(org) => &org.login,
            Owner::User(user) => &user.login,
        };
        login.value().map(String::as_str)
    }

    pub fn repositories(&self) -> &BTreeMap<RepoId, Repository> {
        match self {
            Owner::Organization(org) => &org.repositories,
            Owner::User(user) => &user.repositories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_selects_variant() {
        assert_eq!(
            OwnerRef::from_account_type("Organization", 3),
            OwnerRef::Organization(OrgId(3))
        );
        assert_eq!(OwnerRef::from_account_type("User", 3), OwnerRef::User(UserId(3)));
        assert_eq!(OwnerRef::from_account_type("Bot", 3), OwnerRef::User(UserId(3)));
    }

    #[test]
    fn owner_accessors_match_the_variant() {
        let mut org = Organization::stub(OrgId(1));
        org.login = Field::Value("acme".into());
        org.repositories.insert(RepoId(10), Repository::stub(RepoId(10)));
        let owner = Owner::Organization(org);

        assert_eq!(owner.id(), OwnerRef::Organization(OrgId(1)));
        assert_eq!(owner.login(), Some("acme"));
        assert_eq!(owner.repositories().len(), 1);

        let owner = Owner::User(User::stub(UserId(2)));
        assert_eq!(owner.id(), OwnerRef::User(UserId(2)));
        assert_eq!(owner.login(), None);
        assert!(owner.repositories().is_empty());
    }
}
