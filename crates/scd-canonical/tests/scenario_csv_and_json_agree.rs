use scd_canonical::*;
use scd_schemas::{Attributes, Key, TableSchema};

#[test]
fn same_table_from_csv_and_json_gives_same_snapshot() {
    let schema = TableSchema::new("products", ["category", "product_id"], ["name", "price"]);

    let csv = "Category,Product-ID,Name,Price\n\
               electronics,001,Laptop,999.99\n\
               books,001,Novel,\n\
               electronics,002,Phone,599\n";
    let json = r#"[
        {"category": "electronics", "product_id": "002", "name": "Phone", "price": 599},
        {"category": "books", "product_id": "001", "name": "Novel", "price": null},
        {"category": "electronics", "product_id": "001", "name": "Laptop", "price": "999.99"}
    ]"#;

    let from_csv = canonicalize(&Batch::from_csv_str(csv).unwrap(), &schema).unwrap();
    let from_json = canonicalize(&Batch::from_json_str(json).unwrap(), &schema).unwrap();

    assert_eq!(from_csv, from_json);
    assert_eq!(from_csv.len(), 3);
    assert_eq!(
        from_csv.get(&Key::new(["books", "001"])),
        Some(&Attributes::new([Some("Novel".to_string()), None]))
    );

    // Deterministic key order regardless of input order.
    let keys: Vec<String> = from_csv.keys().map(|k| k.to_string()).collect();
    assert_eq!(keys, ["books|001", "electronics|001", "electronics|002"]);
}

#[test]
fn composite_key_duplicates_only_when_every_part_matches() {
    let schema = TableSchema::new("products", ["category", "product_id"], ["name"]);
    let ok = "category,product_id,name\na,1,x\nb,1,y\n";
    assert!(canonicalize(&Batch::from_csv_str(ok).unwrap(), &schema).is_ok());

    let dup = "category,product_id,name\na,1,x\na,1,y\n";
    assert!(canonicalize(&Batch::from_csv_str(dup).unwrap(), &schema).is_err());
}
