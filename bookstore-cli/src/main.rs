// bookstore: command-line driver for the embedded bookstore database

use anyhow::{Context, Result};
use bookstore_core::{Collection, Database, FindOptions};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

const EMBEDDED_BOOKS: &str = include_str!("../data/books.json");

#[derive(Parser)]
#[command(name = "bookstore", version, about = "Embedded bookstore database demo")]
struct Cli {
    /// Path to the database file
    #[arg(long, default_value = "bookstore.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the sample catalog into the books collection
    Seed {
        /// JSON file with an array of books; defaults to the built-in catalog
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Run the full demo: queries, updates, aggregations, and indexing
    Run,
    /// Print database statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db = Database::open(&cli.db)
        .with_context(|| format!("Failed to open database at {}", cli.db.display()))?;

    match cli.command {
        Command::Seed { file } => seed(&db, file.as_deref()),
        Command::Run => run_demo(&db),
        Command::Stats => stats(&db),
    }
}

fn seed(db: &Database, file: Option<&std::path::Path>) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => EMBEDDED_BOOKS.to_string(),
    };
    let docs: Vec<Value> = serde_json::from_str(&raw).context("Seed file must be a JSON array")?;

    let books = db.collection("books")?;
    let existing = books.count_documents(&json!({}))?;
    if existing > 0 {
        println!(
            "Collection 'books' already holds {} documents; skipping seed",
            existing
        );
        return Ok(());
    }

    let count = docs.len();
    books.insert_many(docs)?;
    println!("Inserted {} books", count);
    Ok(())
}

fn stats(db: &Database) -> Result<()> {
    let stats = db.stats();
    println!("Database:    {}", stats.path.display());
    println!("Instance id: {}", stats.database_id);
    println!("File size:   {} bytes", stats.file_size);
    println!("Collections: {}", stats.collection_count);
    for (name, count) in &stats.document_counts {
        println!("  {}: {} documents", name, count);
    }
    Ok(())
}

fn run_demo(db: &Database) -> Result<()> {
    let books = db.collection("books")?;
    if books.count_documents(&json!({}))? == 0 {
        seed(db, None)?;
        println!();
    }

    query_demos(&books)?;
    update_and_delete_demos(&books)?;
    projection_and_sort_demos(&books)?;
    aggregation_demos(&books)?;
    index_demos(&books)?;
    Ok(())
}

fn query_demos(books: &Arc<Collection>) -> Result<()> {
    banner("Queries");

    println!("All fiction books:");
    print_docs(&books.find(&json!({"genre": "Fiction"}))?);

    println!("\nBooks published after 2010:");
    print_docs(&books.find(&json!({"published_year": {"$gt": 2010}}))?);

    println!("\nBooks by George Orwell:");
    print_docs(&books.find(&json!({"author": "George Orwell"}))?);
    Ok(())
}

fn update_and_delete_demos(books: &Arc<Collection>) -> Result<()> {
    banner("Updates and deletes");

    let result = books.update_one(
        &json!({"title": "The Alchemist"}),
        &json!({"$set": {"price": 11.99}}),
    )?;
    println!(
        "updateOne matched {} modified {}",
        result.matched_count, result.modified_count
    );

    let updated = books.find_with_options(
        &json!({"title": "The Alchemist"}),
        &FindOptions::new().projection(&json!({"title": 1, "price": 1, "_id": 0}))?,
    )?;
    println!("After the update:");
    print_docs(&updated);

    let result = books.delete_one(&json!({"title": "Moby Dick"}))?;
    println!("\ndeleteOne removed {} document(s)", result.deleted_count);
    println!(
        "Remaining books: {}",
        books.count_documents(&json!({}))?
    );
    Ok(())
}

fn projection_and_sort_demos(books: &Arc<Collection>) -> Result<()> {
    banner("Projection, sorting, pagination");

    println!("In-stock books (title, author, price only):");
    let options =
        FindOptions::new().projection(&json!({"title": 1, "author": 1, "price": 1, "_id": 0}))?;
    print_docs(&books.find_with_options(&json!({"in_stock": true}), &options)?);

    println!("\nCheapest first:");
    let asc = books.find_with_options(
        &json!({}),
        &FindOptions::new()
            .sort(&[("price", 1)])
            .projection(&json!({"title": 1, "price": 1, "_id": 0}))?,
    )?;
    print_docs(&asc);

    println!("\nMost expensive first:");
    let desc = books.find_with_options(
        &json!({}),
        &FindOptions::new()
            .sort(&[("price", -1)])
            .projection(&json!({"title": 1, "price": 1, "_id": 0}))?,
    )?;
    print_docs(&desc);

    println!("\nPage 2 of titles (5 per page):");
    let page = books.find_with_options(
        &json!({}),
        &FindOptions::new()
            .sort(&[("title", 1)])
            .skip(5)
            .limit(5)
            .projection(&json!({"title": 1, "_id": 0}))?,
    )?;
    print_docs(&page);
    Ok(())
}

fn aggregation_demos(books: &Arc<Collection>) -> Result<()> {
    banner("Aggregation");

    println!("Average price and count per genre:");
    print_docs(&books.aggregate(&[
        json!({"$group": {
            "_id": "$genre",
            "avgPrice": {"$avg": "$price"},
            "count": {"$sum": 1}
        }}),
        json!({"$sort": {"count": -1}}),
    ])?);

    println!("\nAuthor with the most books:");
    print_docs(&books.aggregate(&[
        json!({"$group": {"_id": "$author", "bookCount": {"$sum": 1}}}),
        json!({"$sort": {"bookCount": -1}}),
        json!({"$limit": 1}),
    ])?);

    println!("\nBooks per decade:");
    print_docs(&books.aggregate(&[
        json!({"$project": {
            "decade": {"$concat": [
                {"$toString": {"$subtract": [
                    "$published_year",
                    {"$mod": ["$published_year", 10]}
                ]}},
                "s"
            ]}
        }}),
        json!({"$group": {"_id": "$decade", "count": {"$sum": 1}}}),
        json!({"$sort": {"_id": 1}}),
    ])?);
    Ok(())
}

fn index_demos(books: &Arc<Collection>) -> Result<()> {
    banner("Indexes and query plans");

    println!("Current indexes:");
    print_docs(&books.list_indexes());

    // Start from a clean slate; on a fresh database this index does
    // not exist yet, so a failure here is expected and non-fatal
    match books.drop_index("title_1") {
        Ok(()) => println!("\nDropped index title_1"),
        Err(e) => println!("\nCould not drop title_1: {}", e),
    }

    let title_filter = json!({"title": "Clean Code"});
    println!("\nexplain before indexing:");
    report_plan(&books.explain(&title_filter)?);

    let name = books.create_index(&[("title", 1)], false)?;
    println!("\nCreated index {}", name);
    let name = books.create_index(&[("author", 1), ("published_year", -1)], false)?;
    println!("Created index {}", name);

    println!("\nexplain after indexing:");
    report_plan(&books.explain(&title_filter)?);

    println!("\nIndexes now:");
    print_docs(&books.list_indexes());
    Ok(())
}

/// Summarize an explain document: winning stage plus the counters.
fn report_plan(explain: &Value) {
    let winning = &explain["queryPlanner"]["winningPlan"];
    let stage = winning["inputStage"]["stage"]
        .as_str()
        .or_else(|| winning["stage"].as_str())
        .unwrap_or("UNKNOWN");
    println!("  stage:             {}", stage);
    if let Some(index) = winning["inputStage"]["indexName"].as_str() {
        println!("  index:             {}", index);
    }
    let stats = &explain["executionStats"];
    println!("  nReturned:         {}", stats["nReturned"]);
    println!("  totalKeysExamined: {}", stats["totalKeysExamined"]);
    println!("  totalDocsExamined: {}", stats["totalDocsExamined"]);
}

fn banner(title: &str) {
    println!("\n=== {} ===", title);
}

fn print_docs(docs: &[Value]) {
    for doc in docs {
        println!("{}", doc);
    }
    if docs.is_empty() {
        println!("(no documents)");
    }
}
