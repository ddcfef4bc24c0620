//! PostgreSQL store
//!
//! Schema lives in `migrations/0001_init.sql`. Status columns hold stable
//! codes; items share one table keyed by the `dtype` discriminator.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::aggregate::{
    Aggregate, Category, CategoryTree, Delivery, DeliveryStatus, Item, ItemKind, Member, Order,
    OrderItem, OrderStatus,
};
use crate::domain::{
    Address, AuditFields, Auditable, CategoryId, DeliveryId, DomainError, ItemId, MemberId,
    OrderId, OrderItemId, PasswordHash, StableCode,
};

use super::{
    CategoryRepository, ItemRepository, MemberRepository, OrderRepository, Repository,
    RepositoryError,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const MEMBER_COLUMNS: &str = "id, username, password_hash, name, city, street, zipcode, \
     created_by, created_at, last_modified_by, last_modified_at";

const ITEM_COLUMNS: &str = "id, dtype, name, price, stock_quantity, author, isbn, artist, etc, \
     director, actor, created_by, created_at, last_modified_by, last_modified_at";

const ORDER_COLUMNS: &str = "o.id, o.member_id, o.order_date, o.status, \
     o.created_by, o.created_at, o.last_modified_by, o.last_modified_at, \
     d.id AS delivery_id, d.status AS delivery_status, \
     d.city AS delivery_city, d.street AS delivery_street, d.zipcode AS delivery_zipcode";

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn is_violation(err: &sqlx::Error, code: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().is_some_and(|found| found == code),
        _ => false,
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Corrupt(format!("{} out of range: {}", column, value)))
}

fn audit_from_row(row: &PgRow) -> Result<AuditFields, RepositoryError> {
    Ok(AuditFields {
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        last_modified_by: row.try_get("last_modified_by")?,
        last_modified_at: row.try_get("last_modified_at")?,
    })
}

fn member_from_row(row: &PgRow) -> Result<Member, RepositoryError> {
    let city: Option<String> = row.try_get("city")?;
    let street: Option<String> = row.try_get("street")?;
    let zipcode: Option<String> = row.try_get("zipcode")?;
    let address = city.map(|city| {
        Address::new(city, street.unwrap_or_default(), zipcode.unwrap_or_default())
    });

    Ok(Member::from_db_state(
        MemberId::new(row.try_get("id")?),
        row.try_get("username")?,
        PasswordHash::from_stored(row.try_get::<String, _>("password_hash")?),
        row.try_get("name")?,
        address,
        audit_from_row(row)?,
    ))
}

fn kind_from_row(row: &PgRow) -> Result<ItemKind, RepositoryError> {
    let text = |column: &str| -> Result<String, RepositoryError> {
        Ok(row
            .try_get::<Option<String>, _>(column)?
            .unwrap_or_default())
    };

    let dtype: String = row.try_get("dtype")?;
    match dtype.as_str() {
        "B" => Ok(ItemKind::Book {
            author: text("author")?,
            isbn: text("isbn")?,
        }),
        "A" => Ok(ItemKind::Album {
            artist: text("artist")?,
            etc: text("etc")?,
        }),
        "M" => Ok(ItemKind::Movie {
            director: text("director")?,
            actor: text("actor")?,
        }),
        other => Err(RepositoryError::Corrupt(format!("unknown item dtype: {}", other))),
    }
}

/// Variant columns in table order: author, isbn, artist, etc, director, actor
fn kind_columns(kind: &ItemKind) -> [Option<&str>; 6] {
    match kind {
        ItemKind::Book { author, isbn } => {
            [Some(author.as_str()), Some(isbn.as_str()), None, None, None, None]
        }
        ItemKind::Album { artist, etc } => {
            [None, None, Some(artist.as_str()), Some(etc.as_str()), None, None]
        }
        ItemKind::Movie { director, actor } => {
            [None, None, None, None, Some(director.as_str()), Some(actor.as_str())]
        }
    }
}

fn item_from_row(row: &PgRow, categories: BTreeSet<CategoryId>) -> Result<Item, RepositoryError> {
    Ok(Item::from_db_state(
        ItemId::new(row.try_get("id")?),
        row.try_get("name")?,
        to_u32(row.try_get("price")?, "price")?,
        to_u32(row.try_get("stock_quantity")?, "stock_quantity")?,
        categories,
        kind_from_row(row)?,
        audit_from_row(row)?,
    ))
}

fn category_from_row(row: &PgRow) -> Result<Category, RepositoryError> {
    let parent: Option<i64> = row.try_get("parent_id")?;
    Ok(Category::from_db_state(
        CategoryId::new(row.try_get("id")?),
        row.try_get("name")?,
        parent.map(CategoryId::new),
    ))
}

fn order_item_from_row(row: &PgRow) -> Result<OrderItem, RepositoryError> {
    Ok(OrderItem::from_db_state(
        OrderItemId::from_uuid(row.try_get("id")?),
        ItemId::new(row.try_get("item_id")?),
        to_u32(row.try_get("order_price")?, "order_price")?,
        to_u32(i64::from(row.try_get::<i32, _>("count")?), "count")?,
    ))
}

fn order_from_row(row: &PgRow, lines: Vec<OrderItem>) -> Result<Order, RepositoryError> {
    let delivery = Delivery::from_db_state(
        DeliveryId::new(row.try_get("delivery_id")?),
        DeliveryStatus::decode(row.try_get::<&str, _>("delivery_status")?)
            .map_err(DomainError::from)?,
        Address::new(
            row.try_get::<String, _>("delivery_city")?,
            row.try_get::<String, _>("delivery_street")?,
            row.try_get::<String, _>("delivery_zipcode")?,
        ),
    );
    let order_date: NaiveDate = row.try_get("order_date")?;
    let status =
        OrderStatus::decode(row.try_get::<&str, _>("status")?).map_err(DomainError::from)?;

    Ok(Order::from_db_state(
        OrderId::new(row.try_get("id")?),
        MemberId::new(row.try_get("member_id")?),
        lines,
        delivery,
        order_date,
        status,
        audit_from_row(row)?,
    ))
}

// =============================================================================
// Shared queries
// =============================================================================

async fn load_items(
    conn: &mut PgConnection,
    category: Option<CategoryId>,
) -> Result<Vec<Item>, RepositoryError> {
    let query = format!(
        "SELECT {} FROM items \
         WHERE $1::BIGINT IS NULL \
            OR id IN (SELECT item_id FROM category_item WHERE category_id = $1) \
         ORDER BY id",
        ITEM_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(category.map(CategoryId::value))
        .fetch_all(&mut *conn)
        .await?;

    let ids: Vec<i64> = rows
        .iter()
        .map(|row| row.try_get::<i64, _>("id"))
        .collect::<Result<_, _>>()?;
    let mut memberships = load_memberships(conn, &ids).await?;

    rows.iter()
        .map(|row| {
            let id: i64 = row.try_get("id")?;
            item_from_row(row, memberships.remove(&id).unwrap_or_default())
        })
        .collect()
}

async fn load_memberships(
    conn: &mut PgConnection,
    item_ids: &[i64],
) -> Result<BTreeMap<i64, BTreeSet<CategoryId>>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT item_id, category_id FROM category_item WHERE item_id = ANY($1)
        "#,
    )
    .bind(item_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut memberships: BTreeMap<i64, BTreeSet<CategoryId>> = BTreeMap::new();
    for row in rows {
        let item_id: i64 = row.try_get("item_id")?;
        let category_id: i64 = row.try_get("category_id")?;
        memberships
            .entry(item_id)
            .or_default()
            .insert(CategoryId::new(category_id));
    }
    Ok(memberships)
}

async fn load_order_lines(
    conn: &mut PgConnection,
    order_id: i64,
) -> Result<Vec<OrderItem>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT id, item_id, order_price, count
        FROM order_items
        WHERE order_id = $1
        ORDER BY line_no
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(order_item_from_row).collect()
}

async fn load_orders(
    conn: &mut PgConnection,
    filter: &str,
    value: i64,
    lock: bool,
) -> Result<Vec<Order>, RepositoryError> {
    let query = format!(
        "SELECT {} FROM orders o JOIN deliveries d ON d.id = o.delivery_id \
         WHERE {} ORDER BY o.id{}",
        ORDER_COLUMNS,
        filter,
        if lock { " FOR UPDATE OF o" } else { "" }
    );
    let rows = sqlx::query(&query).bind(value).fetch_all(&mut *conn).await?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in &rows {
        let lines = load_order_lines(conn, row.try_get("id")?).await?;
        orders.push(order_from_row(row, lines)?);
    }
    Ok(orders)
}

async fn load_category_tree(conn: &mut PgConnection) -> Result<CategoryTree, RepositoryError> {
    let rows = sqlx::query("SELECT id, name, parent_id FROM categories ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    let categories = rows
        .iter()
        .map(category_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CategoryTree::from_categories(categories)?)
}

/// Serialize tree changes so cycle checks see every committed link
async fn lock_categories(conn: &mut PgConnection) -> Result<(), RepositoryError> {
    sqlx::query("LOCK TABLE categories IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Members
// =============================================================================

#[async_trait]
impl Repository<Member> for PgStore {
    async fn save(&self, mut member: Member) -> Result<Member, RepositoryError> {
        let address = member.address().cloned();
        let audit = member.audit_fields().clone();
        let city = address.as_ref().map(|a| a.city().to_string());
        let street = address.as_ref().map(|a| a.street().to_string());
        let zipcode = address.as_ref().map(|a| a.zipcode().to_string());

        let result = match member.id() {
            None => sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO members (
                    username, password_hash, name, city, street, zipcode,
                    created_by, created_at, last_modified_by, last_modified_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING id
                "#,
            )
            .bind(member.username())
            .bind(member.password().as_str())
            .bind(member.name())
            .bind(&city)
            .bind(&street)
            .bind(&zipcode)
            .bind(&audit.created_by)
            .bind(audit.created_at)
            .bind(&audit.last_modified_by)
            .bind(audit.last_modified_at)
            .fetch_one(&self.pool)
            .await
            .map(Some),
            Some(id) => sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE members
                SET username = $2, password_hash = $3, name = $4,
                    city = $5, street = $6, zipcode = $7,
                    created_by = $8, created_at = $9,
                    last_modified_by = $10, last_modified_at = $11
                WHERE id = $1
                RETURNING id
                "#,
            )
            .bind(id.value())
            .bind(member.username())
            .bind(member.password().as_str())
            .bind(member.name())
            .bind(&city)
            .bind(&street)
            .bind(&zipcode)
            .bind(&audit.created_by)
            .bind(audit.created_at)
            .bind(&audit.last_modified_by)
            .bind(audit.last_modified_at)
            .fetch_optional(&self.pool)
            .await,
        };

        match result {
            Ok(Some(id)) => {
                member.assign_id(MemberId::new(id));
                Ok(member)
            }
            Ok(None) => Err(RepositoryError::not_found(
                "Member",
                member.id().map(|id| id.to_string()).unwrap_or_default(),
            )),
            Err(e) if is_violation(&e, UNIQUE_VIOLATION) => {
                Err(RepositoryError::UniqueViolation(member.username().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, RepositoryError> {
        let query = format!("SELECT {} FROM members WHERE id = $1", MEMBER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn delete(&self, member: &Member) -> Result<(), RepositoryError> {
        let id = member
            .id()
            .ok_or_else(|| RepositoryError::not_found("Member", "<unsaved>"))?;

        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id.value())
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(RepositoryError::not_found("Member", id)),
            Ok(_) => Ok(()),
            Err(e) if is_violation(&e, FOREIGN_KEY_VIOLATION) => {
                Err(RepositoryError::still_referenced("Member", id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MemberRepository for PgStore {
    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM members WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Member>, RepositoryError> {
        let query = format!("SELECT {} FROM members WHERE username = $1", MEMBER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }
}

// =============================================================================
// Items
// =============================================================================

#[async_trait]
impl Repository<Item> for PgStore {
    async fn save(&self, mut item: Item) -> Result<Item, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let [author, isbn, artist, etc, director, actor] = kind_columns(item.kind());
        let audit = item.audit_fields().clone();

        let id: Option<i64> = match item.id() {
            None => Some(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO items (
                        dtype, name, price, stock_quantity,
                        author, isbn, artist, etc, director, actor,
                        created_by, created_at, last_modified_by, last_modified_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    RETURNING id
                    "#,
                )
                .bind(item.kind().discriminator())
                .bind(item.name())
                .bind(i64::from(item.price()))
                .bind(i64::from(item.stock_quantity()))
                .bind(author)
                .bind(isbn)
                .bind(artist)
                .bind(etc)
                .bind(director)
                .bind(actor)
                .bind(&audit.created_by)
                .bind(audit.created_at)
                .bind(&audit.last_modified_by)
                .bind(audit.last_modified_at)
                .fetch_one(&mut *tx)
                .await?,
            ),
            // dtype is not updated: the variant is fixed at creation.
            Some(id) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE items
                    SET name = $2, price = $3, stock_quantity = $4,
                        author = $5, isbn = $6, artist = $7, etc = $8,
                        director = $9, actor = $10,
                        created_by = $11, created_at = $12,
                        last_modified_by = $13, last_modified_at = $14
                    WHERE id = $1
                    RETURNING id
                    "#,
                )
                .bind(id.value())
                .bind(item.name())
                .bind(i64::from(item.price()))
                .bind(i64::from(item.stock_quantity()))
                .bind(author)
                .bind(isbn)
                .bind(artist)
                .bind(etc)
                .bind(director)
                .bind(actor)
                .bind(&audit.created_by)
                .bind(audit.created_at)
                .bind(&audit.last_modified_by)
                .bind(audit.last_modified_at)
                .fetch_optional(&mut *tx)
                .await?
            }
        };
        let id = match id {
            Some(id) => id,
            None => {
                return Err(RepositoryError::not_found(
                    "Item",
                    item.id().map(|id| id.to_string()).unwrap_or_default(),
                ))
            }
        };

        sqlx::query("DELETE FROM category_item WHERE item_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for category in item.categories() {
            sqlx::query("INSERT INTO category_item (category_id, item_id) VALUES ($1, $2)")
                .bind(category.value())
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_violation(&e, FOREIGN_KEY_VIOLATION) {
                        RepositoryError::not_found("Category", category)
                    } else {
                        e.into()
                    }
                })?;
        }

        tx.commit().await?;
        item.assign_id(ItemId::new(id));
        Ok(item)
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let query = format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.value())
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                let mut memberships = load_memberships(&mut conn, &[id.value()]).await?;
                let categories = memberships.remove(&id.value()).unwrap_or_default();
                Ok(Some(item_from_row(&row, categories)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, item: &Item) -> Result<(), RepositoryError> {
        let id = item
            .id()
            .ok_or_else(|| RepositoryError::not_found("Item", "<unsaved>"))?;

        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id.value())
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(RepositoryError::not_found("Item", id)),
            Ok(_) => Ok(()),
            Err(e) if is_violation(&e, FOREIGN_KEY_VIOLATION) => {
                Err(RepositoryError::still_referenced("Item", id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ItemRepository for PgStore {
    async fn find_all(&self) -> Result<Vec<Item>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_items(&mut conn, None).await
    }

    async fn find_all_by_category(
        &self,
        category: CategoryId,
    ) -> Result<Vec<Item>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_items(&mut conn, Some(category)).await
    }
}

// =============================================================================
// Categories
// =============================================================================

#[async_trait]
impl Repository<Category> for PgStore {
    async fn save(&self, mut category: Category) -> Result<Category, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_categories(&mut tx).await?;
        let mut tree = load_category_tree(&mut tx).await?;

        let parent = category.parent_id().map(CategoryId::value);
        let id: i64 = match category.id() {
            None => {
                sqlx::query_scalar(
                    "INSERT INTO categories (name, parent_id) VALUES ($1, $2) RETURNING id",
                )
                .bind(category.name())
                .bind(parent)
                .fetch_one(&mut *tx)
                .await?
            }
            Some(id) if tree.contains(id) => {
                sqlx::query("UPDATE categories SET name = $2, parent_id = $3 WHERE id = $1")
                    .bind(id.value())
                    .bind(category.name())
                    .bind(parent)
                    .execute(&mut *tx)
                    .await?;
                id.value()
            }
            Some(id) => return Err(RepositoryError::not_found("Category", id)),
        };

        category.assign_id(CategoryId::new(id));
        tree.insert(category.clone())?;

        tx.commit().await?;
        Ok(category)
    }

    async fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, parent_id FROM categories WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn delete(&self, category: &Category) -> Result<(), RepositoryError> {
        let id = category
            .id()
            .ok_or_else(|| RepositoryError::not_found("Category", "<unsaved>"))?;

        let mut tx = self.pool.begin().await?;
        lock_categories(&mut tx).await?;
        let mut tree = load_category_tree(&mut tx).await?;
        tree.remove(id)?;

        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.value())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for PgStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, parent_id FROM categories WHERE name = $1 ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn find_all_by_name(&self, name: &str) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, parent_id FROM categories WHERE name = $1 ORDER BY id")
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(category_from_row).collect()
    }

    async fn find_all_by_parent_name(
        &self,
        name: &str,
    ) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.parent_id
            FROM categories c
            JOIN categories p ON p.id = c.parent_id
            WHERE p.name = $1
            ORDER BY c.id
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(category_from_row).collect()
    }

    async fn load_tree(&self) -> Result<CategoryTree, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_category_tree(&mut conn).await
    }

    async fn attach(
        &self,
        parent: CategoryId,
        child: CategoryId,
    ) -> Result<Category, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_categories(&mut tx).await?;
        let mut tree = load_category_tree(&mut tx).await?;
        tree.attach(parent, child)?;

        sqlx::query("UPDATE categories SET parent_id = $2 WHERE id = $1")
            .bind(child.value())
            .bind(parent.value())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tree.get(child)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("Category", child))
    }

    async fn detach(&self, child: CategoryId) -> Result<Category, RepositoryError> {
        let row = sqlx::query(
            "UPDATE categories SET parent_id = NULL WHERE id = $1 RETURNING id, name, parent_id",
        )
        .bind(child.value())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => category_from_row(&row),
            None => Err(RepositoryError::not_found("Category", child)),
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

impl PgStore {
    async fn write_order(
        conn: &mut PgConnection,
        order: &mut Order,
    ) -> Result<(), RepositoryError> {
        let delivery = order.delivery().clone();
        let audit = order.audit_fields().clone();

        let delivery_id: i64 = match delivery.id() {
            None => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO deliveries (status, city, street, zipcode)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    "#,
                )
                .bind(delivery.status().code())
                .bind(delivery.address().city())
                .bind(delivery.address().street())
                .bind(delivery.address().zipcode())
                .fetch_one(&mut *conn)
                .await?
            }
            Some(id) => {
                sqlx::query(
                    "UPDATE deliveries SET status = $2, city = $3, street = $4, zipcode = $5 WHERE id = $1",
                )
                .bind(id.value())
                .bind(delivery.status().code())
                .bind(delivery.address().city())
                .bind(delivery.address().street())
                .bind(delivery.address().zipcode())
                .execute(&mut *conn)
                .await?;
                id.value()
            }
        };
        order.assign_delivery_id(DeliveryId::new(delivery_id));

        let result = match order.id() {
            None => sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO orders (
                    member_id, delivery_id, order_date, status,
                    created_by, created_at, last_modified_by, last_modified_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id
                "#,
            )
            .bind(order.member_id().value())
            .bind(delivery_id)
            .bind(order.order_date())
            .bind(order.status().code())
            .bind(&audit.created_by)
            .bind(audit.created_at)
            .bind(&audit.last_modified_by)
            .bind(audit.last_modified_at)
            .fetch_one(&mut *conn)
            .await
            .map(Some),
            Some(id) => sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE orders
                SET member_id = $2, delivery_id = $3, order_date = $4, status = $5,
                    created_by = $6, created_at = $7,
                    last_modified_by = $8, last_modified_at = $9
                WHERE id = $1
                RETURNING id
                "#,
            )
            .bind(id.value())
            .bind(order.member_id().value())
            .bind(delivery_id)
            .bind(order.order_date())
            .bind(order.status().code())
            .bind(&audit.created_by)
            .bind(audit.created_at)
            .bind(&audit.last_modified_by)
            .bind(audit.last_modified_at)
            .fetch_optional(&mut *conn)
            .await,
        };
        let order_id = match result {
            Ok(Some(id)) => id,
            Ok(None) => {
                return Err(RepositoryError::not_found(
                    "Order",
                    order.id().map(|id| id.to_string()).unwrap_or_default(),
                ))
            }
            Err(e) if is_violation(&e, FOREIGN_KEY_VIOLATION) => {
                return Err(RepositoryError::not_found("Member", order.member_id()))
            }
            Err(e) => return Err(e.into()),
        };
        order.assign_id(OrderId::new(order_id));

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
        for (line_no, line) in order.order_items().iter().enumerate() {
            let line_id: Uuid = line.id().as_uuid();
            let result = sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, item_id, order_price, count, line_no)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line_id)
            .bind(order_id)
            .bind(line.item_id().value())
            .bind(i64::from(line.order_price()))
            .bind(i32::try_from(line.count()).map_err(|_| {
                DomainError::InvalidQuantity(format!("count {} out of range", line.count()))
            })?)
            .bind(line_no as i32)
            .execute(&mut *conn)
            .await;

            match result {
                Ok(_) => {}
                Err(e) if is_violation(&e, UNIQUE_VIOLATION) => {
                    return Err(RepositoryError::UniqueViolation(line.id().to_string()))
                }
                Err(e) if is_violation(&e, FOREIGN_KEY_VIOLATION) => {
                    return Err(RepositoryError::not_found("Item", line.item_id()))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Lock the order and its items, then hand their current state to `transition`.
    /// Stock, status and audit fields commit in one transaction.
    async fn transition_order(
        &self,
        id: OrderId,
        auditor: &str,
        transition: impl FnOnce(&mut Order, &mut BTreeMap<ItemId, Item>) -> Result<(), DomainError>
            + Send,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut order = load_orders(&mut tx, "o.id = $1", id.value(), true)
            .await?
            .pop()
            .ok_or_else(|| RepositoryError::not_found("Order", id))?;

        let requirements = order.stock_requirements();
        let item_ids: Vec<i64> = requirements.keys().map(|id| id.value()).collect();
        let query = format!(
            "SELECT {} FROM items WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(&item_ids)
            .fetch_all(&mut *tx)
            .await?;
        // Only stock is written back, so memberships are not loaded.
        let mut inventory = rows
            .iter()
            .map(|row| -> Result<(ItemId, Item), RepositoryError> {
                let item = item_from_row(row, BTreeSet::new())?;
                Ok((ItemId::new(row.try_get("id")?), item))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let before: BTreeMap<ItemId, u32> = inventory
            .iter()
            .map(|(id, item)| (*id, item.stock_quantity()))
            .collect();
        transition(&mut order, &mut inventory)?;

        for (item_id, item) in &inventory {
            let previous = before.get(item_id).copied().unwrap_or_default();
            let delta = i64::from(item.stock_quantity()) - i64::from(previous);
            if delta == 0 {
                continue;
            }
            let done = sqlx::query(
                r#"
                UPDATE items
                SET stock_quantity = stock_quantity + $2
                WHERE id = $1 AND stock_quantity + $2 >= 0
                "#,
            )
            .bind(item_id.value())
            .bind(delta)
            .execute(&mut *tx)
            .await?;
            if done.rows_affected() == 0 {
                return Err(DomainError::insufficient_stock(
                    *item_id,
                    delta.unsigned_abs(),
                    previous,
                )
                .into());
            }
        }

        order.audit_fields_mut().touch(auditor, Utc::now());
        let audit = order.audit_fields();
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                created_by = $3, created_at = $4,
                last_modified_by = $5, last_modified_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id.value())
        .bind(order.status().code())
        .bind(&audit.created_by)
        .bind(audit.created_at)
        .bind(&audit.last_modified_by)
        .bind(audit.last_modified_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(order)
    }
}

#[async_trait]
impl Repository<Order> for PgStore {
    async fn save(&self, mut order: Order) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        match order.id() {
            Some(id) => {
                let stored = load_orders(&mut tx, "o.id = $1", id.value(), true)
                    .await?
                    .pop()
                    .ok_or_else(|| RepositoryError::not_found("Order", id))?;
                order.ensure_can_overwrite(Some(&stored))?;
            }
            None => order.ensure_can_overwrite(None)?,
        }

        Self::write_order(&mut tx, &mut order).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_orders(&mut conn, "o.id = $1", id.value(), false)
            .await?
            .pop())
    }

    async fn delete(&self, order: &Order) -> Result<(), RepositoryError> {
        let id = order
            .id()
            .ok_or_else(|| RepositoryError::not_found("Order", "<unsaved>"))?;

        let mut tx = self.pool.begin().await?;
        let delivery_id: Option<i64> =
            sqlx::query_scalar("DELETE FROM orders WHERE id = $1 RETURNING delivery_id")
                .bind(id.value())
                .fetch_optional(&mut *tx)
                .await?;
        let delivery_id = delivery_id.ok_or_else(|| RepositoryError::not_found("Order", id))?;

        sqlx::query("DELETE FROM deliveries WHERE id = $1")
            .bind(delivery_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn find_all_by_member(&self, member: MemberId) -> Result<Vec<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_orders(&mut conn, "o.member_id = $1", member.value(), false).await
    }

    async fn find_by_order_item(&self, id: OrderItemId) -> Result<Option<Order>, RepositoryError> {
        let order_id: Option<i64> =
            sqlx::query_scalar("SELECT order_id FROM order_items WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match order_id {
            Some(order_id) => {
                <Self as Repository<Order>>::find_by_id(self, OrderId::new(order_id)).await
            }
            None => Ok(None),
        }
    }

    async fn place_order(&self, id: OrderId, auditor: &str) -> Result<Order, RepositoryError> {
        self.transition_order(id, auditor, |order, inventory| order.place_order(inventory))
            .await
    }

    async fn cancel_order(&self, id: OrderId, auditor: &str) -> Result<Order, RepositoryError> {
        self.transition_order(id, auditor, |order, inventory| order.cancel_order(inventory))
            .await
    }
}
