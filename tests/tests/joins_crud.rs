use griddle::{Action, Dialect, Field, FieldType, Model};
use griddle_core::Value;
use pretty_assertions::assert_eq;
use tests::{exec, fetch_one, row, sqlite};

fn contact_schema(persistence: &griddle::Persistence) {
    exec(
        persistence,
        "create table employee (id integer primary key autoincrement, \
         name text, contact_id integer)",
    );
    exec(
        persistence,
        "create table contact (id integer primary key autoincrement, phone text)",
    );
}

/// `employee` with the `contact` table folded in through a forward join.
fn employee_model(persistence: &std::rc::Rc<griddle::Persistence>) -> Model {
    let mut model = Model::new("employee");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    let contact = model.add_join("contact").unwrap();
    model
        .add_field("phone", Field::new(FieldType::String).joined(contact))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

fn profile_schema(persistence: &griddle::Persistence) {
    exec(
        persistence,
        "create table person (id integer primary key autoincrement, name text)",
    );
    exec(
        persistence,
        "create table profile (id integer primary key autoincrement, \
         person_id integer, bio text)",
    );
}

/// `person` with a reverse-joined `profile` row keyed by `person_id`.
fn person_model(persistence: &std::rc::Rc<griddle::Persistence>) -> Model {
    let mut model = Model::new("person");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    let profile = model.add_join("profile.person_id").unwrap();
    model
        .add_field("bio", Field::new(FieldType::String).joined(profile))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

#[test]
fn forward_join_folds_into_the_select() {
    let persistence = sqlite();
    let employee = employee_model(&persistence);

    let rendered = employee
        .action(Action::Select)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select \"employee\".\"id\", \"employee\".\"name\", \
         \"employee\".\"contact_id\", \"contact\".\"phone\" \
         from \"employee\" inner join \"contact\" \
         on \"contact\".\"id\" = \"employee\".\"contact_id\""
    );
}

#[test]
fn insert_writes_master_and_joined_rows() {
    let persistence = sqlite();
    contact_schema(&persistence);
    let employee = employee_model(&persistence);

    let id = employee
        .insert(row(&[
            ("name", Value::from("John")),
            ("phone", Value::from("+371 111")),
        ]))
        .unwrap();
    assert_eq!(id, Value::I64(1));

    assert_eq!(
        fetch_one(&persistence, "select count(*) from contact"),
        Value::I64(1)
    );
    // the foreign id travelled into the master row
    assert_eq!(
        fetch_one(&persistence, "select contact_id from employee"),
        Value::I64(1)
    );

    let mut entity = employee.clone();
    entity.load(id).unwrap();
    assert_eq!(entity.get("phone").unwrap(), Value::from("+371 111"));
}

#[test]
fn saving_a_joined_field_updates_the_foreign_row() {
    let persistence = sqlite();
    contact_schema(&persistence);
    let employee = employee_model(&persistence);
    let id = employee
        .insert(row(&[
            ("name", Value::from("John")),
            ("phone", Value::from("+371 111")),
        ]))
        .unwrap();

    let mut entity = employee.clone();
    entity.load(id.clone()).unwrap();
    entity.set("phone", "+371 222").unwrap();
    entity.save().unwrap();

    // one contact row, rewritten in place
    assert_eq!(
        fetch_one(&persistence, "select count(*) from contact"),
        Value::I64(1)
    );
    let mut fresh = employee.clone();
    fresh.load(id).unwrap();
    assert_eq!(fresh.get("phone").unwrap(), Value::from("+371 222"));
}

#[test]
fn mixed_update_touches_both_tables() {
    let persistence = sqlite();
    contact_schema(&persistence);
    let employee = employee_model(&persistence);
    let id = employee
        .insert(row(&[
            ("name", Value::from("John")),
            ("phone", Value::from("+371 111")),
        ]))
        .unwrap();

    let mut entity = employee.clone();
    entity.load(id.clone()).unwrap();
    entity.set("name", "Johnny").unwrap();
    entity.set("phone", "+371 333").unwrap();
    entity.save().unwrap();

    assert_eq!(
        fetch_one(&persistence, "select name from employee"),
        Value::from("Johnny")
    );
    assert_eq!(
        fetch_one(&persistence, "select phone from contact"),
        Value::from("+371 333")
    );
}

#[test]
fn delete_removes_the_joined_row() {
    let persistence = sqlite();
    contact_schema(&persistence);
    let employee = employee_model(&persistence);
    let id = employee
        .insert(row(&[
            ("name", Value::from("John")),
            ("phone", Value::from("+371 111")),
        ]))
        .unwrap();

    let mut entity = employee.clone();
    entity.load(id).unwrap();
    entity.delete().unwrap();

    assert_eq!(
        fetch_one(&persistence, "select count(*) from employee"),
        Value::I64(0)
    );
    assert_eq!(
        fetch_one(&persistence, "select count(*) from contact"),
        Value::I64(0)
    );
}

#[test]
fn reverse_join_keys_the_foreign_row_by_master_id() {
    let persistence = sqlite();
    profile_schema(&persistence);
    let person = person_model(&persistence);

    let rendered = person
        .action(Action::Select)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select \"person\".\"id\", \"person\".\"name\", \"profile\".\"bio\" \
         from \"person\" inner join \"profile\" \
         on \"profile\".\"person_id\" = \"person\".\"id\""
    );

    let id = person
        .insert(row(&[
            ("name", Value::from("Jane")),
            ("bio", Value::from("hi there")),
        ]))
        .unwrap();
    assert_eq!(
        fetch_one(&persistence, "select person_id from profile"),
        Value::I64(1)
    );

    let mut entity = person.clone();
    entity.load(id.clone()).unwrap();
    assert_eq!(entity.get("bio").unwrap(), Value::from("hi there"));

    entity.set("bio", "updated").unwrap();
    entity.save().unwrap();
    assert_eq!(
        fetch_one(&persistence, "select bio from profile"),
        Value::from("updated")
    );

    entity.delete().unwrap();
    assert_eq!(
        fetch_one(&persistence, "select count(*) from profile"),
        Value::I64(0)
    );
}

#[test]
fn weak_join_reads_but_never_writes() {
    let persistence = sqlite();
    contact_schema(&persistence);
    exec(&persistence, "insert into contact (phone) values ('+371 111')");
    exec(
        &persistence,
        "insert into employee (name, contact_id) values ('John', 1)",
    );

    let mut model = Model::new("employee");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    let contact = model.add_weak_join("contact").unwrap();
    model
        .add_field("phone", Field::new(FieldType::String).joined(contact))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();

    let rendered = model
        .action(Action::Select)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert!(rendered.sql.contains("left join \"contact\""));

    let mut entity = model.clone();
    entity.load(1).unwrap();
    assert_eq!(entity.get("phone").unwrap(), Value::from("+371 111"));

    // writes through a weak join are dropped
    entity.set("phone", "+371 999").unwrap();
    entity.save().unwrap();
    assert_eq!(
        fetch_one(&persistence, "select phone from contact"),
        Value::from("+371 111")
    );

    entity.delete().unwrap();
    assert_eq!(
        fetch_one(&persistence, "select count(*) from contact"),
        Value::I64(1)
    );
}

#[test]
fn join_alias_prefixes_the_joined_columns() {
    let persistence = sqlite();
    let mut employee = employee_model(&persistence);
    employee.join_mut(0).unwrap().set_alias("c");

    let rendered = employee
        .action(Action::Select)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select \"employee\".\"id\", \"employee\".\"name\", \
         \"employee\".\"contact_id\", \"c\".\"phone\" \
         from \"employee\" inner join \"contact\" \"c\" \
         on \"c\".\"id\" = \"employee\".\"contact_id\""
    );
}

#[test]
fn raw_join_helpers_are_sql_only() {
    let mut model = Model::new("employee");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    let contact = model.add_join("contact").unwrap();
    model
        .add_field("phone", Field::new(FieldType::String).joined(contact))
        .unwrap();
    let array = griddle::Array::new();
    model
        .set_persistence(std::rc::Rc::new(griddle::Persistence::Array(array)))
        .unwrap();

    let err = model
        .insert(row(&[
            ("name", Value::from("John")),
            ("phone", Value::from("+371 111")),
        ]))
        .unwrap_err();
    assert!(err.is_unsupported());
}
