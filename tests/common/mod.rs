#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use univo::{
    clubs::{self, CreateClub},
    models::{Club, NewUser, User},
    store::{DynStore, MemoryStore},
};

pub fn store() -> DynStore {
    Arc::new(MemoryStore::new())
}

/// Inserts a user directly; the password hash is never checked here.
pub async fn user(store: &DynStore, username: &str) -> User {
    store
        .insert_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@campus.edu"),
            password_hash: "unused".to_string(),
            first_name: username.to_string(),
            last_name: "Tester".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

/// A club whose only admin is `admin`.
pub async fn club(store: &DynStore, admin: &User, name: &str) -> Club {
    let (club, _) = clubs::create(
        store,
        admin.id,
        CreateClub {
            name: name.to_string(),
            description: "testing".to_string(),
            category: Some("academic".to_string()),
            logo: None,
            banner: None,
            max_members: None,
        },
    )
    .await
    .unwrap();
    club
}
