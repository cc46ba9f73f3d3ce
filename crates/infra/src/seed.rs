//! First-run defaults: demo accounts and starter categories.

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use stockadoodle_auth::{NewUser, Role, User, hash_password};
use stockadoodle_inventory::{Category, CategoryInput};

use crate::store::Store;

pub const DEFAULT_CATEGORIES: [&str; 5] = ["Meat", "Seafood", "Pantry Items", "Junk Food", "Pet Food (Wet & Dry)"];

const DEMO_PASSWORD: &str = "password";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users_created: usize,
    pub categories_created: usize,
}

/// Create the default users when the store has none, and the default
/// categories when there are none. Running it twice changes nothing.
pub async fn seed_defaults(store: &dyn Store, admin_password: &str, now: DateTime<Utc>) -> anyhow::Result<SeedReport> {
    let mut report = SeedReport::default();

    if store.list_users(None).await?.is_empty() {
        let accounts = [
            ("admin", admin_password, Role::Admin),
            ("manager", DEMO_PASSWORD, Role::Manager),
            ("retailer", DEMO_PASSWORD, Role::Retailer),
        ];
        for (username, password, role) in accounts {
            let new = NewUser {
                username: username.to_string(),
                password: password.to_string(),
                email: None,
                role,
            };
            let hash = hash_password(password).with_context(|| format!("hashing password for {username}"))?;
            let user = User::create(new, hash, now).with_context(|| format!("seeding user {username}"))?;
            store.create_user(user).await?;
            report.users_created += 1;
        }
    }

    if store.list_categories().await?.is_empty() {
        for name in DEFAULT_CATEGORIES {
            let category = Category::create(CategoryInput {
                name: name.to_string(),
                description: None,
            })?;
            store.create_category(category).await?;
            report.categories_created += 1;
        }
    }

    info!(
        users = report.users_created,
        categories = report.categories_created,
        "seeded defaults"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn seeds_once() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let first = seed_defaults(&store, "admin", now).await.unwrap();
        assert_eq!(first.users_created, 3);
        assert_eq!(first.categories_created, DEFAULT_CATEGORIES.len());

        let second = seed_defaults(&store, "admin", now).await.unwrap();
        assert_eq!(second, SeedReport::default());

        let admin = store.find_user_by_username("admin").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(stockadoodle_auth::verify_password(&admin.password_hash, "admin"));

        let retailer = store.find_user_by_username("retailer").await.unwrap().unwrap();
        assert!(store.get_metrics(retailer.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keeps_existing_categories() {
        let store = InMemoryStore::new();
        store
            .create_category(
                Category::create(CategoryInput {
                    name: "Dairy".into(),
                    description: None,
                })
                .unwrap(),
            )
            .await
            .unwrap();

        let report = seed_defaults(&store, "secret", Utc::now()).await.unwrap();
        assert_eq!(report.categories_created, 0);
        assert_eq!(store.list_categories().await.unwrap().len(), 1);
    }
}
