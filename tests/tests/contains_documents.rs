use griddle::{Field, FieldType, Model};
use griddle_core::Value;
use pretty_assertions::assert_eq;
use tests::{exec, fetch_one, row, sqlite};

fn person_schema(persistence: &griddle::Persistence) {
    exec(
        persistence,
        "create table person (id integer primary key autoincrement, \
         name text, address text, lines text)",
    );
}

/// Contained prototypes carry no persistence; traversal hands each one a
/// private in-memory store seeded from the owner's document.
fn address_model() -> Model {
    let mut model = Model::new("address");
    model
        .add_field("street", Field::new(FieldType::String))
        .unwrap();
    model
        .add_field("city", Field::new(FieldType::String))
        .unwrap();
    model
}

fn line_model() -> Model {
    let mut model = Model::new("line");
    model
        .add_field("item", Field::new(FieldType::String))
        .unwrap();
    model
        .add_field("qty", Field::new(FieldType::Integer))
        .unwrap();
    model
}

fn person_model(persistence: &std::rc::Rc<griddle::Persistence>) -> Model {
    let mut model = Model::new("person");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    model.contains_one("address", address_model()).unwrap();
    model.contains_many("lines", line_model()).unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

#[test]
fn contains_one_round_trips_through_save() {
    let persistence = sqlite();
    person_schema(&persistence);

    let mut entity = person_model(&persistence);
    entity.set("name", "Ann").unwrap();
    entity
        .with_ref("address", |address| {
            address
                .insert(row(&[
                    ("street", Value::from("Main st 1")),
                    ("city", Value::from("Riga")),
                ]))
                .map(|_| ())
        })
        .unwrap();
    entity.save().unwrap();

    // the column itself holds serialized json
    let stored = fetch_one(&persistence, "select address from person");
    let document: serde_json::Value = match &stored {
        Value::String(text) => serde_json::from_str(text).unwrap(),
        other => panic!("expected a json string, got {other:?}"),
    };
    assert_eq!(
        document,
        serde_json::json!({"id": 1, "street": "Main st 1", "city": "Riga"})
    );

    let mut fresh = person_model(&persistence);
    fresh.load(1).unwrap();
    let address = fresh.ref_("address").unwrap();
    let rows = address.export().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["street"], Value::from("Main st 1"));
    assert_eq!(rows[0]["city"], Value::from("Riga"));
}

#[test]
fn contained_documents_edit_in_place() {
    let persistence = sqlite();
    person_schema(&persistence);

    let mut entity = person_model(&persistence);
    entity.set("name", "Ann").unwrap();
    entity
        .with_ref("address", |address| {
            address
                .insert(row(&[
                    ("street", Value::from("Main st 1")),
                    ("city", Value::from("Riga")),
                ]))
                .map(|_| ())
        })
        .unwrap();
    entity.save().unwrap();

    entity
        .with_ref("address", |address| {
            address.load_any()?;
            address.set("city", "Liepaja")?;
            address.save()?;
            Ok(())
        })
        .unwrap();
    entity.save().unwrap();

    let mut fresh = person_model(&persistence);
    fresh.load(1).unwrap();
    let address = fresh.ref_("address").unwrap();
    let rows = address.export().unwrap();
    assert_eq!(rows[0]["city"], Value::from("Liepaja"));
    // the untouched column survives the rewrite
    assert_eq!(rows[0]["street"], Value::from("Main st 1"));
}

#[test]
fn contains_many_keeps_every_line() {
    let persistence = sqlite();
    person_schema(&persistence);

    let mut entity = person_model(&persistence);
    entity.set("name", "Ann").unwrap();
    entity
        .with_ref("lines", |lines| {
            for (item, qty) in [("apple", 3), ("pear", 1), ("plum", 7)] {
                lines.insert(row(&[
                    ("item", Value::from(item)),
                    ("qty", Value::from(qty)),
                ]))?;
            }
            Ok(())
        })
        .unwrap();
    entity.save().unwrap();

    let stored = fetch_one(&persistence, "select lines from person");
    let document: serde_json::Value = match &stored {
        Value::String(text) => serde_json::from_str(text).unwrap(),
        other => panic!("expected a json array string, got {other:?}"),
    };
    assert_eq!(
        document,
        serde_json::json!([
            {"id": 1, "item": "apple", "qty": 3},
            {"id": 2, "item": "pear", "qty": 1},
            {"id": 3, "item": "plum", "qty": 7}
        ])
    );

    let mut fresh = person_model(&persistence);
    fresh.load(1).unwrap();
    let lines = fresh.ref_("lines").unwrap();
    assert_eq!(lines.count().unwrap(), 3);

    let items: Vec<Value> = lines
        .export()
        .unwrap()
        .into_iter()
        .map(|row| row["item"].clone())
        .collect();
    assert_eq!(
        items,
        vec![Value::from("apple"), Value::from("pear"), Value::from("plum")]
    );
}

#[test]
fn deleting_every_line_clears_the_document() {
    let persistence = sqlite();
    person_schema(&persistence);

    let mut entity = person_model(&persistence);
    entity.set("name", "Ann").unwrap();
    entity
        .with_ref("lines", |lines| {
            lines.insert(row(&[("item", Value::from("apple")), ("qty", Value::from(1))]))?;
            lines.insert(row(&[("item", Value::from("pear")), ("qty", Value::from(2))]))?;
            Ok(())
        })
        .unwrap();
    entity.save().unwrap();

    entity
        .with_ref("lines", |lines| {
            while lines.try_load_any()? {
                lines.delete()?;
            }
            Ok(())
        })
        .unwrap();
    entity.save().unwrap();

    assert_eq!(
        fetch_one(&persistence, "select lines is null from person"),
        Value::I64(1)
    );

    let mut fresh = person_model(&persistence);
    fresh.load(1).unwrap();
    assert_eq!(fresh.ref_("lines").unwrap().count().unwrap(), 0);
}

#[test]
fn the_backing_field_rejects_direct_writes() {
    let persistence = sqlite();
    let mut entity = person_model(&persistence);

    let err = entity.set("address", "oops").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("contained document"));
}

#[test]
fn a_malformed_document_is_reported() {
    let persistence = sqlite();
    person_schema(&persistence);
    exec(
        &persistence,
        "insert into person (name, lines) values ('Ann', '{\"not\": \"a list\"}')",
    );

    let mut entity = person_model(&persistence);
    entity.load(1).unwrap();
    let err = entity.ref_("lines").unwrap_err();
    assert!(err.is_invalid_format());
}

#[test]
fn contained_rows_keep_their_ids_across_edits() {
    let persistence = sqlite();
    person_schema(&persistence);

    let mut entity = person_model(&persistence);
    entity.set("name", "Ann").unwrap();
    entity
        .with_ref("lines", |lines| {
            lines.insert(row(&[("item", Value::from("apple")), ("qty", Value::from(1))]))?;
            lines.insert(row(&[("item", Value::from("pear")), ("qty", Value::from(2))]))?;
            Ok(())
        })
        .unwrap();
    entity.save().unwrap();

    // delete the first line; the second keeps its id
    entity
        .with_ref("lines", |lines| {
            lines.load(1)?;
            lines.delete()
        })
        .unwrap();
    entity.save().unwrap();

    let mut fresh = person_model(&persistence);
    fresh.load(1).unwrap();
    let rows = fresh.ref_("lines").unwrap().export().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Value::I64(2));
    assert_eq!(rows[0]["item"], Value::from("pear"));
}
