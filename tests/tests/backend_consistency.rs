//! The in-memory backend must be indistinguishable from SQLite for every
//! dataset operation: same typed values, same null semantics, same order.

use chrono::NaiveDate;
use griddle::{Array, Field, FieldType, Model, Operator, Persistence};
use griddle_core::Value;
use pretty_assertions::assert_eq;
use tests::{exec, row, sqlite};

use std::rc::Rc;

fn member_model(persistence: &Rc<Persistence>) -> Model {
    let mut model = Model::new("member");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    model
        .add_field("age", Field::new(FieldType::Integer))
        .unwrap();
    model
        .add_field("joined", Field::new(FieldType::Date))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

fn date(y: i32, m: u32, d: u32) -> Value {
    Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn seed(model: &Model) {
    for (name, age, joined) in [
        ("John", Value::I64(30), date(2024, 1, 15)),
        ("Jane", Value::I64(25), date(2023, 6, 1)),
        ("Joe", Value::I64(40), date(2024, 3, 2)),
    ] {
        model
            .insert(row(&[
                ("name", Value::from(name)),
                ("age", age),
                ("joined", joined),
            ]))
            .unwrap();
    }
    // a record with nothing but a name
    model.insert(row(&[("name", Value::from("Ann"))])).unwrap();
}

/// The same seeded dataset on both backends.
fn backends() -> [Model; 2] {
    let sql = sqlite();
    exec(
        &sql,
        "create table member (id integer primary key autoincrement, \
         name text, age integer, joined text)",
    );
    let sql_model = member_model(&sql);
    seed(&sql_model);

    let array_model = member_model(&Rc::new(Persistence::Array(Array::new())));
    seed(&array_model);

    [sql_model, array_model]
}

#[test]
fn exports_agree_row_for_row() {
    let [sql, array] = backends();
    let rows = sql.export().unwrap();

    assert_eq!(rows.len(), 4);
    // typed values survive the wire identically: dates come back as dates,
    // unset columns as explicit nulls
    assert_eq!(rows[0]["joined"], date(2024, 1, 15));
    assert_eq!(rows[3]["age"], Value::Null);
    assert_eq!(rows, array.export().unwrap());
}

#[test]
fn conditions_filter_the_same_records() {
    let conditions: Vec<fn(&mut Model)> = vec![
        |m| {
            m.add_condition(("name", "Jane"));
        },
        |m| {
            m.add_condition(("age", Operator::Gt, 28));
        },
        |m| {
            m.add_condition(("age", Operator::Lt, 35));
        },
        |m| {
            m.add_condition(("name", Operator::Like, "J%"));
        },
        |m| {
            m.add_condition(("name", Operator::In, vec!["John", "Ann"]));
        },
        |m| {
            m.add_condition(("name", Operator::NotIn, vec!["John", "Ann"]));
        },
        |m| {
            m.add_condition(("joined", Operator::Ge, date(2024, 1, 1)));
        },
    ];

    for shape in conditions {
        let [mut sql, mut array] = backends();
        shape(&mut sql);
        shape(&mut array);
        assert_eq!(sql.export().unwrap(), array.export().unwrap());
        assert_eq!(sql.count().unwrap(), array.count().unwrap());
    }
}

#[test]
fn null_comparisons_follow_sql_rules() {
    for mut model in backends() {
        // an equality against null is an is-null test
        model.add_condition(("age", Value::Null));
        let rows = model.export().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::from("Ann"));
    }

    for mut model in backends() {
        // a null field never satisfies an ordinary comparison
        model.add_condition(("age", Operator::Gt, 0));
        assert_eq!(model.count().unwrap(), 3);
    }

    for mut model in backends() {
        model.add_condition(("age", Operator::Ne, Value::Null));
        assert_eq!(model.count().unwrap(), 3);
    }
}

#[test]
fn empty_membership_lists_agree() {
    for mut model in backends() {
        model.add_condition(("age", Operator::In, Vec::<Value>::new()));
        assert_eq!(model.count().unwrap(), 0);
        assert!(!model.exists().unwrap());
    }

    for mut model in backends() {
        model.add_condition(("age", Operator::NotIn, Vec::<Value>::new()));
        assert_eq!(model.count().unwrap(), 4);
    }
}

#[test]
fn or_groups_agree() {
    let [mut sql, mut array] = backends();
    for model in [&mut sql, &mut array] {
        model.add_condition(vec![
            ("age", Operator::Gt, Value::I64(35)),
            ("age", Operator::Lt, Value::I64(28)),
        ]);
    }
    assert_eq!(sql.export().unwrap(), array.export().unwrap());
    assert_eq!(sql.count().unwrap(), 2);
}

#[test]
fn order_and_limit_agree() {
    let [mut sql, mut array] = backends();
    for model in [&mut sql, &mut array] {
        model.set_order("age", true).unwrap();
        model.set_limit(2, Some(1));
    }
    let rows = sql.export().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], Value::from("John"));
    assert_eq!(rows[1]["name"], Value::from("Jane"));
    assert_eq!(rows, array.export().unwrap());
}

#[test]
fn nulls_sort_first_ascending_on_both() {
    let [mut sql, mut array] = backends();
    for model in [&mut sql, &mut array] {
        model.set_order("age", false).unwrap();
    }
    let rows = sql.export().unwrap();
    assert_eq!(rows[0]["name"], Value::from("Ann"));
    assert_eq!(rows, array.export().unwrap());
}

#[test]
fn load_any_picks_the_same_record() {
    let [mut sql, mut array] = backends();
    for model in [&mut sql, &mut array] {
        model.set_order("joined", true).unwrap();
        model.load_any().unwrap();
    }
    assert_eq!(sql.get("name").unwrap(), Value::from("Joe"));
    assert_eq!(sql.get("name").unwrap(), array.get("name").unwrap());
}

#[test]
fn aggregates_agree() {
    let [sql, array] = backends();
    for fx in ["sum", "min", "max", "avg", "count"] {
        assert_eq!(
            sql.fx(fx, "age").unwrap(),
            array.fx(fx, "age").unwrap(),
            "fx {fx:?} diverged"
        );
    }
    assert_eq!(sql.fx("sum", "age").unwrap(), Value::I64(95));
    assert_eq!(sql.fx("avg", "age").unwrap(), Value::F64(95.0 / 3.0));

    let [mut sql, mut array] = backends();
    for model in [&mut sql, &mut array] {
        model.add_condition(("age", Operator::Gt, 100));
    }
    assert_eq!(sql.fx("sum", "age").unwrap(), Value::Null);
    assert_eq!(array.fx("sum", "age").unwrap(), Value::Null);
    assert_eq!(sql.fx0("sum", "age").unwrap(), Value::I64(0));
    assert_eq!(array.fx0("sum", "age").unwrap(), Value::I64(0));
}

#[test]
fn crud_round_trips_stay_in_lockstep() {
    let [mut sql, mut array] = backends();
    for model in [&mut sql, &mut array] {
        model.load(2).unwrap();
        model.set("age", 26).unwrap();
        model.save().unwrap();
        model.unload();

        model.load(3).unwrap();
        model.delete().unwrap();
    }
    assert_eq!(sql.count().unwrap(), 3);
    assert_eq!(sql.export().unwrap(), array.export().unwrap());
}

#[test]
fn load_by_title_matches() {
    let [mut sql, mut array] = backends();
    for model in [&mut sql, &mut array] {
        model.load_by("name", "Joe").unwrap();
    }
    assert_eq!(sql.get("id").unwrap(), Value::I64(3));
    assert_eq!(sql.get("id").unwrap(), array.get("id").unwrap());
    assert_eq!(sql.get("joined").unwrap(), date(2024, 3, 2));
}

#[test]
fn has_many_traversal_agrees() {
    let sql = sqlite();
    exec(
        &sql,
        "create table user (id integer primary key autoincrement, name text)",
    );
    exec(
        &sql,
        "create table contact (id integer primary key autoincrement, \
         user_id integer, phone text)",
    );
    exec(&sql, "insert into user (name) values ('John')");
    exec(
        &sql,
        "insert into contact (user_id, phone) values (1, '123')",
    );

    let store = Array::new();
    store
        .seed(
            "user",
            vec![row(&[("id", Value::I64(1)), ("name", Value::from("John"))])],
            "id",
        )
        .unwrap();
    store
        .seed(
            "contact",
            vec![row(&[
                ("id", Value::I64(1)),
                ("user_id", Value::I64(1)),
                ("phone", Value::from("123")),
            ])],
            "id",
        )
        .unwrap();
    let array = Rc::new(Persistence::Array(store));

    for persistence in [sql, array] {
        let mut user = Model::new("user");
        user.add_field("name", Field::new(FieldType::String))
            .unwrap();
        let mut contact = Model::new("contact");
        contact
            .add_field("user_id", Field::new(FieldType::Integer))
            .unwrap();
        contact
            .add_field("phone", Field::new(FieldType::String))
            .unwrap();
        user.has_many("contact", contact).unwrap();
        user.set_persistence(persistence).unwrap();

        user.load(1).unwrap();
        let contacts = user.ref_("contact").unwrap();
        let rows = contacts.export().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["phone"], Value::from("123"));
    }
}
