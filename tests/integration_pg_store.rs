//! PostgreSQL store integration tests
//!
//! Run against the database named by `DATABASE_URL`; skipped when it is unset.

use std::sync::Arc;

use jpashop::aggregate::{Aggregate, Category, Delivery, Item, ItemKind, Member, Order, OrderStatus};
use jpashop::audit::AuditLogService;
use jpashop::domain::{Address, Auditable, DomainError, PasswordHash};
use jpashop::handlers::{SignUpCommand, SignUpHandler};
use jpashop::repository::{
    CategoryRepository, ItemRepository, MemberRepository, OrderRepository, PgStore,
    RepositoryError,
};
use jpashop::{AppError, OperationContext};

mod common;

fn address() -> Address {
    Address::new("Seoul", "Teheran-ro", "06236")
}

async fn save_member(store: &PgStore) -> Member {
    let members: &dyn MemberRepository = store;
    let password = PasswordHash::hash("secret").unwrap();
    let member = Member::register(common::unique("buyer"), password, "Buyer", Some(address()))
        .unwrap();
    members.save(member).await.unwrap()
}

async fn save_book(store: &PgStore, stock: u32) -> Item {
    let items: &dyn ItemRepository = store;
    items
        .save(Item::book("X", 1000, stock, "Kim", "978-89-000"))
        .await
        .unwrap()
}

/// A saved cart holding `count` units of `book`
async fn save_cart(store: &PgStore, member: &Member, book: &Item, count: u32) -> Order {
    let orders: &dyn OrderRepository = store;
    let mut order = Order::new(member.id().unwrap(), Delivery::new(address()));
    order.add_item(book, book.price(), count).unwrap();
    orders.save(order).await.unwrap()
}

async fn stock_of(store: &PgStore, book: &Item) -> u32 {
    let items: &dyn ItemRepository = store;
    items
        .find_by_id(book.id().unwrap())
        .await
        .unwrap()
        .unwrap()
        .stock_quantity()
}

#[tokio::test]
async fn test_place_and_cancel_order() {
    let Some(store) = common::setup_test_db().await else {
        return;
    };
    let orders: &dyn OrderRepository = &store;

    let member = save_member(&store).await;
    let book = save_book(&store, 5).await;
    let order = save_cart(&store, &member, &book, 2).await;
    let order_id = order.id().unwrap();
    assert_eq!(order.status(), OrderStatus::InCart);
    assert!(order.delivery().id().is_some());

    let placed = orders.place_order(order_id, "clerk").await.unwrap();
    assert_eq!(placed.status(), OrderStatus::Ordered);
    assert_eq!(placed.total_price(), 2000);
    assert_eq!(stock_of(&store, &book).await, 3);

    let stored = orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Ordered);
    assert_eq!(stored.order_items(), order.order_items());
    assert_eq!(stored.audit_fields().last_modified_by.as_deref(), Some("clerk"));

    let line_id = order.order_items()[0].id();
    let owner = orders.find_by_order_item(line_id).await.unwrap().unwrap();
    assert_eq!(owner.id(), Some(order_id));
    assert_eq!(
        orders.find_all_by_member(member.id().unwrap()).await.unwrap().len(),
        1
    );

    let cancelled = orders.cancel_order(order_id, "clerk").await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Returned);
    assert_eq!(stock_of(&store, &book).await, 5);

    assert!(matches!(
        orders.cancel_order(order_id, "clerk").await,
        Err(RepositoryError::Domain(DomainError::InvalidState { .. }))
    ));
}

#[tokio::test]
async fn test_place_order_with_insufficient_stock() {
    let Some(store) = common::setup_test_db().await else {
        return;
    };
    let orders: &dyn OrderRepository = &store;

    let member = save_member(&store).await;
    let book = save_book(&store, 1).await;
    let order_id = save_cart(&store, &member, &book, 2).await.id().unwrap();

    let result = orders.place_order(order_id, "clerk").await;

    assert!(matches!(
        result,
        Err(RepositoryError::Domain(DomainError::InsufficientStock { .. }))
    ));
    assert_eq!(stock_of(&store, &book).await, 1);
    let stored = orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::InCart);
}

#[tokio::test]
async fn test_stale_cart_save_after_placing_rejected() {
    let Some(store) = common::setup_test_db().await else {
        return;
    };
    let orders: &dyn OrderRepository = &store;

    let member = save_member(&store).await;
    let book = save_book(&store, 5).await;
    let stale_cart = save_cart(&store, &member, &book, 2).await;
    let order_id = stale_cart.id().unwrap();

    orders.place_order(order_id, "clerk").await.unwrap();

    assert!(matches!(
        orders.save(stale_cart).await,
        Err(RepositoryError::Domain(DomainError::InvalidState { .. }))
    ));
    let stored = orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Ordered);

    assert!(orders.place_order(order_id, "clerk").await.is_err());
    assert_eq!(stock_of(&store, &book).await, 3);
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let Some(store) = common::setup_test_db().await else {
        return;
    };
    let store = Arc::new(store);
    let members: &dyn MemberRepository = store.as_ref();
    let username = common::unique("tester");

    let password = PasswordHash::hash("secret").unwrap();
    let first = members
        .save(Member::register(username.clone(), password.clone(), "Tester", None).unwrap())
        .await
        .unwrap();
    assert!(first.id().is_some());
    assert!(members.exists_by_username(&username).await.unwrap());

    // the unique index rejects a second row even without the pre-check
    let duplicate = Member::register(username.clone(), password, "Someone", None).unwrap();
    assert!(members.save(duplicate).await.unwrap_err().is_unique_violation());

    let signup = SignUpHandler::new(store.clone(), AuditLogService::default());
    let result = signup
        .execute(
            SignUpCommand::new(username.clone(), "other", "Someone"),
            &OperationContext::new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::Domain(DomainError::AlreadyExists { username: ref taken })) if *taken == username
    ));
}

#[tokio::test]
async fn test_item_variants_round_trip() {
    let Some(store) = common::setup_test_db().await else {
        return;
    };
    let items: &dyn ItemRepository = &store;
    let categories: &dyn CategoryRepository = &store;

    let music = categories
        .save(Category::new(common::unique("music")))
        .await
        .unwrap();
    let music_id = music.id().unwrap();

    let mut album = Item::album("Abbey Road", 2000, 3, "The Beatles", "remaster");
    album.add_category(music_id);
    let album = items.save(album).await.unwrap();
    let movie = items
        .save(Item::movie("Parasite", 3000, 2, "Bong", "Song"))
        .await
        .unwrap();

    let found_album = items.find_by_id(album.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(found_album.name(), "Abbey Road");
    assert_eq!(found_album.kind(), album.kind());
    assert_eq!(found_album.kind().discriminator(), "A");
    assert!(found_album.in_category(music_id));

    let found_movie = items.find_by_id(movie.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(
        found_movie.kind(),
        &ItemKind::Movie {
            director: "Bong".to_string(),
            actor: "Song".to_string(),
        }
    );

    let in_music = items.find_all_by_category(music_id).await.unwrap();
    assert_eq!(in_music.len(), 1);
    assert_eq!(in_music[0].id(), album.id());
}

#[tokio::test]
async fn test_category_attach_rejects_cycle() {
    let Some(store) = common::setup_test_db().await else {
        return;
    };
    let categories: &dyn CategoryRepository = &store;

    let parent_name = common::unique("books");
    let a = categories.save(Category::new(parent_name.clone())).await.unwrap();
    let b = categories
        .save(Category::new(common::unique("novels")))
        .await
        .unwrap();
    let (a_id, b_id) = (a.id().unwrap(), b.id().unwrap());

    let child = categories.attach(a_id, b_id).await.unwrap();
    assert_eq!(child.parent_id(), Some(a_id));

    assert!(matches!(
        categories.attach(b_id, a_id).await,
        Err(RepositoryError::Domain(DomainError::Cycle { .. }))
    ));

    let children = categories.find_all_by_parent_name(&parent_name).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id(), Some(b_id));

    assert!(matches!(
        categories.delete(&a).await,
        Err(RepositoryError::Domain(DomainError::CategoryHasChildren(_)))
    ));
}
