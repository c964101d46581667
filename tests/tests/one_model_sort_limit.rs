use griddle::{Action, Dialect, Operator};
use griddle_core::Value;
use pretty_assertions::assert_eq;
use tests::{seed_users, sqlite, user_model, user_schema};

fn ages(model: &griddle::Model) -> Vec<Value> {
    model
        .export()
        .unwrap()
        .into_iter()
        .map(|row| row.get("age").cloned().unwrap())
        .collect()
}

#[test]
fn order_ascending_and_descending() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.set_order("age", false).unwrap();
    assert_eq!(
        ages(&model),
        vec![Value::I64(25), Value::I64(30), Value::I64(40)]
    );

    let mut desc = user_model(&persistence);
    desc.set_order("age", true).unwrap();
    assert_eq!(
        ages(&desc),
        vec![Value::I64(40), Value::I64(30), Value::I64(25)]
    );
}

#[test]
fn limit_and_shift_slice_the_dataset() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.set_order("age", false).unwrap();
    model.set_limit(2, Some(1));
    assert_eq!(ages(&model), vec![Value::I64(30), Value::I64(40)]);
}

#[test]
fn load_any_picks_the_first_by_order() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.set_order("age", true).unwrap();
    model.load_any().unwrap();
    assert_eq!(model.get("name").unwrap(), Value::from("Joe"));
}

#[test]
fn two_conditions_join_with_and() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.add_condition(("age", Operator::Gt, 28));
    model.add_condition(("age", Operator::Lt, 35));

    let rendered = model
        .action(Action::Select)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select \"id\", \"name\", \"age\" from \"user\" \
         where \"age\" > :a and \"age\" < :b"
    );
    assert_eq!(rendered.params[":a"], Value::I64(28));
    assert_eq!(rendered.params[":b"], Value::I64(35));

    let rows = model.export().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("John")));
}

#[test]
fn column_action_with_membership_condition() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.add_condition(("id", Operator::In, vec![1i64, 2]));
    let rendered = model
        .action(Action::Field {
            name: "name".to_string(),
        })
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select \"name\" from \"user\" where \"id\" in (:a, :b)"
    );
    assert_eq!(rendered.params[":a"], Value::I64(1));
    assert_eq!(rendered.params[":b"], Value::I64(2));
}

#[test]
fn count_ignores_order_and_limit() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.set_order("age", true).unwrap();
    model.set_limit(1, None);
    assert_eq!(model.count().unwrap(), 3);

    let rendered = model
        .action(Action::Count)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(rendered.sql, "select count(*) from \"user\"");
}

#[test]
fn empty_membership_renders_constants() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.add_condition(("id", Operator::In, Vec::<Value>::new()));
    assert_eq!(model.count().unwrap(), 0);

    let mut all = user_model(&persistence);
    all.add_condition(("id", Operator::NotIn, Vec::<Value>::new()));
    assert_eq!(all.count().unwrap(), 3);
}

#[test]
fn only_fields_narrow_the_projection() {
    let persistence = sqlite();
    user_schema(&persistence);
    let mut model = user_model(&persistence);
    seed_users(&model);

    model.set_only_fields(&["name"]).unwrap();
    let rendered = model
        .action(Action::Select)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    // system fields ride along
    assert_eq!(rendered.sql, "select \"id\", \"name\" from \"user\"");

    let rows = model.export().unwrap();
    assert_eq!(rows[0].get("age"), None);
}
