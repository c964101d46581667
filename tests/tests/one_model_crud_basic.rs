use griddle::{Field, FieldType};
use griddle_core::Value;
use pretty_assertions::assert_eq;
use tests::{row, seed_users, sqlite, user_model, user_schema};

#[test]
fn insert_assigns_ids_and_loads_back() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);

    let id = model
        .insert(row(&[
            ("name", Value::from("John")),
            ("age", Value::from(30)),
        ]))
        .unwrap();
    assert_eq!(id, Value::I64(1));

    let mut entity = model.clone();
    entity.load(1).unwrap();
    assert!(entity.is_loaded());
    assert_eq!(entity.get("name").unwrap(), Value::from("John"));
    assert_eq!(entity.get("age").unwrap(), Value::I64(30));
}

#[test]
fn save_persists_only_dirty_fields_and_reloads() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);
    seed_users(&model);

    let mut entity = model.clone();
    entity.load(2).unwrap();
    entity.set("age", 26).unwrap();
    assert!(entity.is_dirty("age"));
    entity.save().unwrap();
    assert!(!entity.is_dirty("age"));

    let mut check = model.clone();
    check.load(2).unwrap();
    assert_eq!(check.get("age").unwrap(), Value::I64(26));
    assert_eq!(check.get("name").unwrap(), Value::from("Jane"));
}

#[test]
fn saving_without_changes_is_a_no_op() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);
    seed_users(&model);

    let mut entity = model.clone();
    entity.load(1).unwrap();
    entity.save().unwrap();
    assert_eq!(entity.get("name").unwrap(), Value::from("John"));
}

#[test]
fn defaults_fill_in_at_insert() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    model
        .add_field(
            "status",
            Field::new(FieldType::String).default_value("active"),
        )
        .unwrap();
    tests::exec(&persistence, "alter table user add column status text");

    let id = model
        .insert(row(&[("name", Value::from("Ann"))]))
        .unwrap();

    let mut entity = model.clone();
    entity.load(id).unwrap();
    assert_eq!(entity.get("status").unwrap(), Value::from("active"));
}

#[test]
fn required_fields_reject_null_on_save() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut strict = user_model(&persistence);
    strict
        .add_field("email", Field::new(FieldType::String).required())
        .unwrap();
    tests::exec(&persistence, "alter table user add column email text");

    let err = strict
        .insert(row(&[("name", Value::from("Ann"))]))
        .unwrap_err();
    assert!(err.is_invalid_format());
    assert!(err.to_string().contains("\"email\" is required"));
}

#[test]
fn not_null_fields_reject_explicit_null() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut strict = user_model(&persistence);
    strict
        .add_field("rank", Field::new(FieldType::Integer).not_null())
        .unwrap();
    tests::exec(&persistence, "alter table user add column rank integer");

    // leaving the field unset is fine; assigning null is not
    let id = strict.insert(row(&[("name", Value::from("Ann"))])).unwrap();

    let err = strict
        .insert(row(&[("name", Value::from("Ben")), ("rank", Value::Null)]))
        .unwrap_err();
    assert!(err.is_invalid_format());
    assert!(err.to_string().contains("must not be null"));

    let mut entity = strict.clone();
    entity.load(id).unwrap();
    entity.set("rank", 5).unwrap();
    entity.save().unwrap();

    entity.set("rank", Value::Null).unwrap();
    let err = entity.save().unwrap_err();
    assert!(err.to_string().contains("must not be null"));
}

#[test]
fn delete_removes_the_record() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);
    seed_users(&model);

    let mut entity = model.clone();
    entity.load(2).unwrap();
    entity.delete().unwrap();
    assert!(!entity.is_loaded());

    assert!(!model.clone().try_load(2).unwrap());
    assert_eq!(model.count().unwrap(), 2);
    assert!(model.exists().unwrap());
}

#[test]
fn load_miss_reports_the_id_and_table() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);

    let err = model.clone().load(99).unwrap_err();
    assert_eq!(
        err.to_string(),
        "user: load failed: record not found: no record matching id=99"
    );
}

#[test]
fn load_by_restores_the_dataset_afterwards() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);
    seed_users(&model);

    let mut entity = model.clone();
    entity.load_by("name", "Joe").unwrap();
    assert_eq!(entity.get("age").unwrap(), Value::I64(40));

    // The temporary condition is gone: the dataset still sees everyone
    assert_eq!(entity.count().unwrap(), 3);

    assert!(!entity.try_load_by("name", "Nobody").unwrap());
}

#[test]
fn export_returns_typed_field_keyed_rows() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);
    seed_users(&model);

    let rows = model.export().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("id"), Some(&Value::I64(1)));
    assert_eq!(rows[0].get("name"), Some(&Value::from("John")));
    assert_eq!(rows[0].get("age"), Some(&Value::I64(30)));
}

#[test]
fn import_seeds_many_records() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);

    model
        .import(vec![
            row(&[("name", Value::from("a")), ("age", Value::from(1))]),
            row(&[("name", Value::from("b")), ("age", Value::from(2))]),
        ])
        .unwrap();
    assert_eq!(model.count().unwrap(), 2);
}

#[test]
fn duplicate_explicit_id_is_an_execution_error() {
    let persistence = sqlite();
    user_schema(&persistence);
    let model = user_model(&persistence);
    seed_users(&model);

    let err = model
        .insert(row(&[("id", Value::from(1)), ("name", Value::from("dup"))]))
        .unwrap_err();
    assert!(err.is_execution());
}
