use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::users::{
    repo::{StoreError, UniqueField, UserStore},
    repo_types::{NewUser, User, UserPatch},
};

/// In-process store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl InMemoryUserStore {
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }
}

fn conflict(users: &[User], skip: Option<Uuid>, email: &str, roll_no: &str) -> Option<UniqueField> {
    let mut others = users.iter().filter(|u| Some(u.id) != skip);
    if others.clone().any(|u| u.email == email) {
        return Some(UniqueField::Email);
    }
    if others.any(|u| u.roll_no == roll_no) {
        return Some(UniqueField::RollNo);
    }
    None
}

/// Store whose every call fails, for exercising backend-error paths.
pub struct FailingUserStore;

fn backend_down() -> StoreError {
    StoreError::Backend(anyhow::anyhow!("connection refused"))
}

#[async_trait]
impl UserStore for FailingUserStore {
    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
        Err(backend_down())
    }

    async fn find_by_roll_no(&self, _roll_no: &str) -> Result<Option<User>, StoreError> {
        Err(backend_down())
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
        Err(backend_down())
    }

    async fn insert(&self, _user: NewUser) -> Result<User, StoreError> {
        Err(backend_down())
    }

    async fn update_by_roll_no(
        &self,
        _roll_no: &str,
        _patch: UserPatch,
    ) -> Result<Option<User>, StoreError> {
        Err(backend_down())
    }

    async fn delete_by_roll_no(&self, _roll_no: &str) -> Result<Option<User>, StoreError> {
        Err(backend_down())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_roll_no(&self, roll_no: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.roll_no == roll_no).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().await;
        if let Some(field) = conflict(&users, None, &user.email, &user.roll_no) {
            return Err(StoreError::Conflict(field));
        }
        let now = OffsetDateTime::now_utc();
        let record = User {
            id: user.id,
            email: user.email,
            roll_no: user.roll_no,
            password_hash: user.password_hash,
            profile: user.profile,
            created_at: now,
            updated_at: now,
        };
        users.push(record.clone());
        Ok(record)
    }

    async fn update_by_roll_no(
        &self,
        roll_no: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().await;
        let Some(idx) = users.iter().position(|u| u.roll_no == roll_no) else {
            return Ok(None);
        };
        let current = &users[idx];
        let email = patch.email.unwrap_or_else(|| current.email.clone());
        let new_roll_no = patch.roll_no.unwrap_or_else(|| current.roll_no.clone());
        if let Some(field) = conflict(&users, Some(current.id), &email, &new_roll_no) {
            return Err(StoreError::Conflict(field));
        }

        let record = &mut users[idx];
        record.email = email;
        record.roll_no = new_roll_no;
        if let Some(hash) = patch.password_hash {
            record.password_hash = hash;
        }
        record.profile.extend(patch.profile);
        record.updated_at = OffsetDateTime::now_utc();
        Ok(Some(record.clone()))
    }

    async fn delete_by_roll_no(&self, roll_no: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().await;
        let removed = users
            .iter()
            .position(|u| u.roll_no == roll_no)
            .map(|idx| users.remove(idx));
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(email: &str, roll_no: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            email: email.into(),
            roll_no: roll_no.into(),
            password_hash: "digest".into(),
            profile: Default::default(),
        }
    }

    #[tokio::test]
    async fn email_conflict_reported_regardless_of_insert_order() {
        for order in [["R1", "R2"], ["R2", "R1"]] {
            let store = InMemoryUserStore::default();
            for roll_no in order {
                let email = if roll_no == "R1" { "a@x.com" } else { "b@x.com" };
                store.insert(record(email, roll_no)).await.unwrap();
            }
            store.insert(record("c@x.com", "R3")).await.unwrap();

            // Collides with R1's email and R2's roll number at once.
            let patch = UserPatch {
                email: Some("a@x.com".into()),
                roll_no: Some("R2".into()),
                ..Default::default()
            };
            let err = store.update_by_roll_no("R3", patch).await.unwrap_err();
            assert!(matches!(err, StoreError::Conflict(UniqueField::Email)));
        }
    }
}
