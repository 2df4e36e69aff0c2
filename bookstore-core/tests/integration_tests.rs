// Integration tests: the full bookstore workflow end to end

use bookstore_core::{Database, FindOptions};
use serde_json::json;
use tempfile::TempDir;

fn open_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("bookstore.db")).unwrap();
    (dir, db)
}

fn seed_books(db: &Database) {
    let books = db.collection("books").unwrap();
    let docs = vec![
        json!({"title": "The Great Gatsby", "author": "F. Scott Fitzgerald", "genre": "Fiction", "published_year": 1925, "price": 10.99, "in_stock": true}),
        json!({"title": "1984", "author": "George Orwell", "genre": "Dystopian", "published_year": 1949, "price": 10.99, "in_stock": true}),
        json!({"title": "Animal Farm", "author": "George Orwell", "genre": "Fiction", "published_year": 1945, "price": 8.50, "in_stock": false}),
        json!({"title": "The Alchemist", "author": "Paulo Coelho", "genre": "Fiction", "published_year": 1988, "price": 10.99, "in_stock": true}),
        json!({"title": "The Hobbit", "author": "J.R.R. Tolkien", "genre": "Fantasy", "published_year": 1937, "price": 14.99, "in_stock": true}),
        json!({"title": "The Lord of the Rings", "author": "J.R.R. Tolkien", "genre": "Fantasy", "published_year": 1954, "price": 19.99, "in_stock": true}),
        json!({"title": "The Martian", "author": "Andy Weir", "genre": "Science Fiction", "published_year": 2014, "price": 15.99, "in_stock": true}),
        json!({"title": "Moby Dick", "author": "Herman Melville", "genre": "Fiction", "published_year": 1851, "price": 9.99, "in_stock": false}),
    ];
    books.insert_many(docs).unwrap();
}

#[test]
fn test_insert_assigns_sequential_ids() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let all = books.find(&json!({})).unwrap();
    assert_eq!(all.len(), 8);
    assert_eq!(all[0]["_id"], json!(1));
    assert_eq!(all[7]["_id"], json!(8));
}

#[test]
fn test_find_by_genre() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let fiction = books.find(&json!({"genre": "Fiction"})).unwrap();
    assert_eq!(fiction.len(), 4);
    assert!(fiction.iter().all(|b| b["genre"] == json!("Fiction")));
}

#[test]
fn test_find_published_after_2010() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let recent = books
        .find(&json!({"published_year": {"$gt": 2010}}))
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["title"], json!("The Martian"));
}

#[test]
fn test_find_one_by_author() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let found = books
        .find_one(&json!({"author": "George Orwell"}))
        .unwrap()
        .unwrap();
    assert_eq!(found["title"], json!("1984"));

    let missing = books.find_one(&json!({"author": "Nobody"})).unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_update_one_set_price() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let result = books
        .update_one(
            &json!({"title": "The Alchemist"}),
            &json!({"$set": {"price": 11.99}}),
        )
        .unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);

    let updated = books
        .find_one(&json!({"title": "The Alchemist"}))
        .unwrap()
        .unwrap();
    assert_eq!(updated["price"], json!(11.99));
    // The rest of the document is untouched
    assert_eq!(updated["author"], json!("Paulo Coelho"));
}

#[test]
fn test_update_many() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let result = books
        .update_many(
            &json!({"in_stock": false}),
            &json!({"$set": {"restock": true}}),
        )
        .unwrap();
    assert_eq!(result.matched_count, 2);
    assert_eq!(result.modified_count, 2);
}

#[test]
fn test_update_without_match() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let result = books
        .update_one(&json!({"title": "Dune"}), &json!({"$set": {"price": 1.0}}))
        .unwrap();
    assert_eq!(result.matched_count, 0);
    assert_eq!(result.modified_count, 0);
}

#[test]
fn test_delete_one() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let result = books.delete_one(&json!({"title": "Moby Dick"})).unwrap();
    assert_eq!(result.deleted_count, 1);
    assert_eq!(books.count_documents(&json!({})).unwrap(), 7);
    assert!(books
        .find_one(&json!({"title": "Moby Dick"}))
        .unwrap()
        .is_none());
}

#[test]
fn test_delete_is_durable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bookstore.db");
    {
        let db = Database::open(&path).unwrap();
        seed_books(&db);
        db.collection("books")
            .unwrap()
            .delete_one(&json!({"title": "Moby Dick"}))
            .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let books = db.collection("books").unwrap();
    assert_eq!(books.count_documents(&json!({})).unwrap(), 7);
}

#[test]
fn test_projection_with_filter() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let options = FindOptions::new()
        .projection(&json!({"title": 1, "author": 1, "price": 1, "_id": 0}))
        .unwrap();
    let results = books
        .find_with_options(&json!({"in_stock": true}), &options)
        .unwrap();

    assert_eq!(results.len(), 6);
    for doc in &results {
        let obj = doc.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(!obj.contains_key("_id"));
        assert!(!obj.contains_key("genre"));
    }
}

#[test]
fn test_sort_by_price_both_directions() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let asc = books
        .find_with_options(&json!({}), &FindOptions::new().sort(&[("price", 1)]))
        .unwrap();
    assert_eq!(asc[0]["title"], json!("Animal Farm"));
    assert_eq!(asc.last().unwrap()["title"], json!("The Lord of the Rings"));

    let desc = books
        .find_with_options(&json!({}), &FindOptions::new().sort(&[("price", -1)]))
        .unwrap();
    assert_eq!(desc[0]["title"], json!("The Lord of the Rings"));
}

#[test]
fn test_pagination() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let sorted = FindOptions::new().sort(&[("title", 1)]);
    let page1 = books
        .find_with_options(&json!({}), &sorted.clone().limit(3))
        .unwrap();
    let page2 = books
        .find_with_options(&json!({}), &sorted.clone().skip(3).limit(3))
        .unwrap();
    let page3 = books
        .find_with_options(&json!({}), &sorted.skip(6).limit(3))
        .unwrap();

    assert_eq!(page1.len(), 3);
    assert_eq!(page2.len(), 3);
    assert_eq!(page3.len(), 2);

    // Pages partition the sorted set with no overlap
    let mut titles: Vec<String> = page1
        .iter()
        .chain(&page2)
        .chain(&page3)
        .map(|d| d["title"].as_str().unwrap().to_string())
        .collect();
    let mut expected = titles.clone();
    expected.sort();
    assert_eq!(titles.len(), 8);
    titles.dedup();
    assert_eq!(titles, expected);
}

#[test]
fn test_count_documents() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    assert_eq!(books.count_documents(&json!({})).unwrap(), 8);
    assert_eq!(
        books
            .count_documents(&json!({"genre": "Fantasy"}))
            .unwrap(),
        2
    );
}

#[test]
fn test_distinct_genres() {
    let (_dir, db) = open_db();
    seed_books(&db);
    let books = db.collection("books").unwrap();

    let genres = books.distinct("genre", &json!({})).unwrap();
    let genres: Vec<&str> = genres.iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(
        genres,
        vec!["Dystopian", "Fantasy", "Fiction", "Science Fiction"]
    );
}

#[test]
fn test_duplicate_id_rejected() {
    let (_dir, db) = open_db();
    let books = db.collection("books").unwrap();

    books
        .insert_one(json!({"_id": 1, "title": "1984"}))
        .unwrap();
    let result = books.insert_one(json!({"_id": 1, "title": "Animal Farm"}));
    assert!(result.is_err());
    assert_eq!(books.count_documents(&json!({})).unwrap(), 1);
}

#[test]
fn test_rejected_duplicate_leaves_original_intact() {
    let (_dir, db) = open_db();
    let books = db.collection("books").unwrap();

    books
        .insert_one(json!({"_id": 1, "title": "1984", "price": 10.99}))
        .unwrap();
    assert!(books
        .insert_one(json!({"_id": 1, "title": "Animal Farm"}))
        .is_err());

    // The stored document is neither shadowed nor unindexed
    let doc = books.find_one(&json!({"_id": 1})).unwrap().unwrap();
    assert_eq!(doc["title"], json!("1984"));
    assert_eq!(doc["price"], json!(10.99));

    // And the count does not drift on repeated attempts
    assert!(books.insert_one(json!({"_id": 1, "title": "Emma"})).is_err());
    assert_eq!(books.count_documents(&json!({})).unwrap(), 1);
}

#[test]
fn test_explicit_string_id() {
    let (_dir, db) = open_db();
    let books = db.collection("books").unwrap();

    books
        .insert_one(json!({"_id": "isbn-0451524934", "title": "1984"}))
        .unwrap();
    let found = books
        .find_one(&json!({"_id": "isbn-0451524934"}))
        .unwrap()
        .unwrap();
    assert_eq!(found["title"], json!("1984"));
}

#[test]
fn test_update_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bookstore.db");
    {
        let db = Database::open(&path).unwrap();
        seed_books(&db);
        db.collection("books")
            .unwrap()
            .update_one(
                &json!({"title": "The Alchemist"}),
                &json!({"$set": {"price": 11.99}}),
            )
            .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let books = db.collection("books").unwrap();
    let doc = books
        .find_one(&json!({"title": "The Alchemist"}))
        .unwrap()
        .unwrap();
    assert_eq!(doc["price"], json!(11.99));
    // Still one document, not two versions
    assert_eq!(
        books
            .count_documents(&json!({"title": "The Alchemist"}))
            .unwrap(),
        1
    );
}
