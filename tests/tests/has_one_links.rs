use griddle::{Action, Dialect, Operator, Reference};
use griddle_core::Value;
use pretty_assertions::assert_eq;
use tests::{country_model, country_schema, row, sqlite, user_model, user_schema};

fn user_with_country(persistence: &std::rc::Rc<griddle::Persistence>) -> griddle::Model {
    let mut user = user_model(persistence);
    user.has_one("country", country_model(persistence)).unwrap();
    user
}

#[test]
fn has_one_declares_its_link_field() {
    let persistence = sqlite();
    let user = user_with_country(&persistence);
    assert!(user.has_field("country_id"));
}

#[test]
fn loaded_traversal_loads_the_related_record() {
    let persistence = sqlite();
    user_schema(&persistence);
    country_schema(&persistence);
    let user = user_with_country(&persistence);
    user.insert(row(&[
        ("name", Value::from("John")),
        ("country", Value::from(1)),
    ]))
    .unwrap_err();

    // the link field is set through its own name, not the reference's
    let id = user
        .insert(row(&[
            ("name", Value::from("John")),
            ("country_id", Value::from(1)),
        ]))
        .unwrap();

    let mut entity = user.clone();
    entity.load(id).unwrap();
    let country = entity.ref_("country").unwrap();
    assert!(country.is_loaded());
    assert_eq!(country.get("name").unwrap(), Value::from("Latvia"));
}

#[test]
fn null_link_yields_an_empty_related_set() {
    let persistence = sqlite();
    user_schema(&persistence);
    country_schema(&persistence);
    let user = user_with_country(&persistence);
    let id = user
        .insert(row(&[("name", Value::from("stateless"))]))
        .unwrap();

    let mut entity = user.clone();
    entity.load(id).unwrap();
    let country = entity.ref_("country").unwrap();
    assert!(!country.is_loaded());
    assert_eq!(country.count().unwrap(), 0);
}

#[test]
fn unloaded_traversal_covers_the_whole_dataset() {
    let persistence = sqlite();
    user_schema(&persistence);
    country_schema(&persistence);
    let user = user_with_country(&persistence);
    for (name, country_id) in [("John", 1), ("Jane", 1), ("Joe", 2)] {
        user.insert(row(&[
            ("name", Value::from(name)),
            ("country_id", Value::from(country_id)),
        ]))
        .unwrap();
    }

    let mut dataset = user_with_country(&persistence);
    dataset.add_condition(("name", Operator::Like, "J%"));
    let countries = dataset.ref_("country").unwrap();
    assert_eq!(countries.count().unwrap(), 2);

    let rendered = countries
        .action(Action::Count)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select count(*) from \"country\" where \"id\" in \
         (select \"country_id\" from \"user\" where \"name\" like :a)"
    );
}

#[test]
fn title_field_reads_and_resolves_names() {
    let persistence = sqlite();
    user_schema(&persistence);
    country_schema(&persistence);
    let mut user = user_with_country(&persistence);
    user.add_title("country", "country_name").unwrap();

    let id = user
        .insert(row(&[
            ("name", Value::from("John")),
            ("country_name", Value::from("Estonia")),
        ]))
        .unwrap();

    let mut entity = user.clone();
    entity.load(id).unwrap();
    assert_eq!(entity.get("country_id").unwrap(), Value::I64(2));
    assert_eq!(entity.get("country_name").unwrap(), Value::from("Estonia"));

    // switching the title re-resolves the link on save
    entity.set("country_name", "Latvia").unwrap();
    entity.save().unwrap();
    assert_eq!(entity.get("country_id").unwrap(), Value::I64(1));
}

#[test]
fn unknown_title_fails_the_save() {
    let persistence = sqlite();
    user_schema(&persistence);
    country_schema(&persistence);
    let mut user = user_with_country(&persistence);
    user.add_title("country", "country_name").unwrap();

    let err = user
        .insert(row(&[
            ("name", Value::from("John")),
            ("country_name", Value::from("Atlantis")),
        ]))
        .unwrap_err();
    assert!(err.to_string().contains("cannot resolve title"));
}

#[test]
fn ref_field_imports_a_related_column() {
    let persistence = sqlite();
    user_schema(&persistence);
    country_schema(&persistence);
    let mut user = user_with_country(&persistence);
    user.add_ref_field("country", "country_name", "name")
        .unwrap();

    let id = user
        .insert(row(&[
            ("name", Value::from("John")),
            ("country_id", Value::from(2)),
        ]))
        .unwrap();

    let mut entity = user.clone();
    entity.load(id).unwrap();
    assert_eq!(entity.get("country_name").unwrap(), Value::from("Estonia"));

    // imported columns are read-only
    assert!(entity
        .set("country_name", "x")
        .unwrap_err()
        .is_configuration());
}

#[test]
fn custom_link_fields_are_honored() {
    let persistence = sqlite();
    country_schema(&persistence);
    tests::exec(
        &persistence,
        "create table user (id integer primary key autoincrement, \
         name text, homeland integer)",
    );

    let mut user = user_model(&persistence);
    user.add_field("homeland", griddle::Field::new(griddle::FieldType::Integer))
        .unwrap();
    user.add_reference(
        Reference::has_one("country", country_model(&persistence)).with_our_field("homeland"),
    )
    .unwrap();

    let id = user
        .insert(row(&[
            ("name", Value::from("John")),
            ("homeland", Value::from(1)),
        ]))
        .unwrap();

    let mut entity = user.clone();
    entity.load(id).unwrap();
    let country = entity.ref_("country").unwrap();
    assert_eq!(country.get("name").unwrap(), Value::from("Latvia"));
}
