//! Seed data script - creates the default accounts and a small demo catalogue
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates (skipping anything that already exists):
//! - admin/admin123, manager/manager123 and user/user123
//! - one supplier
//! - a handful of shoe products

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::info;
use uuid::Uuid;

use shoe_inventory_api::{
    config, db,
    entities::{product, supplier, user, SupplierStatus, UserRole},
    services::{
        products::{NewProduct, ProductService},
        suppliers::{SupplierInput, SupplierService},
        users::{NewUser, UserService},
    },
};

struct SeedUser {
    username: &'static str,
    password: &'static str,
    full_name: &'static str,
    email: &'static str,
    role: UserRole,
}

const USERS: [SeedUser; 3] = [
    SeedUser {
        username: "admin",
        password: "admin123",
        full_name: "Administrator",
        email: "admin@shoestore.local",
        role: UserRole::Admin,
    },
    SeedUser {
        username: "manager",
        password: "manager123",
        full_name: "Store Manager",
        email: "manager@shoestore.local",
        role: UserRole::Manager,
    },
    SeedUser {
        username: "user",
        password: "user123",
        full_name: "Sales Staff",
        email: "user@shoestore.local",
        role: UserRole::User,
    },
];

const SUPPLIER_NAME: &str = "Saigon Footwear Co.";

// sku, name, category, size, color, quantity, cost, price
const PRODUCTS: [(&str, &str, &str, &str, &str, i32, Decimal, Decimal); 5] = [
    ("RUN-001-42-BLK", "Road Runner", "Running", "42", "Black", 25, dec!(650000), dec!(990000)),
    ("RUN-001-43-WHT", "Road Runner", "Running", "43", "White", 12, dec!(650000), dec!(990000)),
    ("SNK-010-40-RED", "Court Classic", "Sneakers", "40", "Red", 8, dec!(420000), dec!(690000)),
    ("BOT-200-41-BRN", "Trail Boot", "Boots", "41", "Brown", 5, dec!(900000), dec!(1450000)),
    ("SND-305-39-BEI", "Summer Sandal", "Sandals", "39", "Beige", 0, dec!(150000), dec!(290000)),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!("=== Shoe Inventory Seed Data ===");
    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&pool).await?;
    let pool = Arc::new(pool);

    let admin_id = seed_users(&pool).await?;
    let supplier_id = seed_supplier(&pool, admin_id).await?;
    let created = seed_products(&pool, admin_id, supplier_id).await?;

    info!("Seed complete: {} new products", created);
    info!("Log in with admin/admin123, manager/manager123 or user/user123");
    Ok(())
}

async fn seed_users(pool: &Arc<DatabaseConnection>) -> anyhow::Result<Uuid> {
    let users = UserService::new(pool.clone());
    let mut admin_id = None;

    for seed in &USERS {
        let existing = user::Entity::find()
            .filter(user::Column::Username.eq(seed.username))
            .one(pool.as_ref())
            .await?;

        let id = match existing {
            Some(found) => {
                info!("  user {} already exists", seed.username);
                found.id
            }
            None => {
                let created = users
                    .create(NewUser {
                        username: seed.username.to_string(),
                        password: seed.password.to_string(),
                        full_name: seed.full_name.to_string(),
                        email: seed.email.to_string(),
                        phone: None,
                        role: Some(seed.role),
                    })
                    .await?;
                info!("  created {} ({})", created.username, created.role);
                created.id
            }
        };

        if seed.role == UserRole::Admin {
            admin_id = Some(id);
        }
    }

    admin_id.ok_or_else(|| anyhow::anyhow!("admin account missing after seeding"))
}

async fn seed_supplier(pool: &Arc<DatabaseConnection>, actor: Uuid) -> anyhow::Result<Uuid> {
    if let Some(found) = supplier::Entity::find()
        .filter(supplier::Column::Name.eq(SUPPLIER_NAME))
        .one(pool.as_ref())
        .await?
    {
        info!("  supplier {} already exists", SUPPLIER_NAME);
        return Ok(found.id);
    }

    let created = SupplierService::new(pool.clone())
        .create(
            actor,
            SupplierInput {
                name: SUPPLIER_NAME.to_string(),
                contact_person: Some("Nguyen Van An".to_string()),
                email: Some("sales@saigonfootwear.local".to_string()),
                phone: "0901234567".to_string(),
                address: Some("12 Nguyen Hue, District 1, Ho Chi Minh City".to_string()),
                tax_code: Some("0312345678".to_string()),
                status: Some(SupplierStatus::Active),
            },
        )
        .await?;
    info!("  created supplier {}", created.name);
    Ok(created.id)
}

async fn seed_products(
    pool: &Arc<DatabaseConnection>,
    actor: Uuid,
    supplier_id: Uuid,
) -> anyhow::Result<usize> {
    let products = ProductService::new(pool.clone());
    let mut created = 0;

    for (sku, name, category, size, color, quantity, cost, price) in PRODUCTS {
        let exists = product::Entity::find()
            .filter(product::Column::Sku.eq(sku))
            .one(pool.as_ref())
            .await?
            .is_some();
        if exists {
            info!("  product {} already exists", sku);
            continue;
        }

        products
            .create(
                actor,
                NewProduct {
                    name: name.to_string(),
                    sku: sku.to_string(),
                    category: category.to_string(),
                    size: size.to_string(),
                    color: color.to_string(),
                    quantity,
                    cost_price: cost,
                    selling_price: price,
                    supplier_id: Some(supplier_id),
                    description: None,
                    image_url: None,
                    status: None,
                },
            )
            .await?;
        created += 1;
    }

    Ok(created)
}
