use griddle::{Action, Aggregate, Dialect, FieldType, Operator};
use griddle_core::Value;
use pretty_assertions::assert_eq;
use tests::{billing_schema, client_model, invoice_model, row, sqlite};

fn seed_billing(persistence: &std::rc::Rc<griddle::Persistence>) {
    billing_schema(persistence);
    let client = client_model(persistence);
    client.insert(row(&[("name", Value::from("Vernon"))])).unwrap();
    client.insert(row(&[("name", Value::from("Ace"))])).unwrap();

    let invoice = invoice_model(persistence);
    for (client_id, total) in [(1, 10.5), (1, 20.25), (2, 5.0)] {
        invoice
            .insert(row(&[
                ("client_id", Value::from(client_id)),
                ("total", Value::from(total)),
            ]))
            .unwrap();
    }
}

fn client_with_invoices(persistence: &std::rc::Rc<griddle::Persistence>) -> griddle::Model {
    let mut client = client_model(persistence);
    client
        .has_many("invoices", invoice_model(persistence))
        .unwrap();
    client
}

#[test]
fn loaded_traversal_restricts_to_the_owner() {
    let persistence = sqlite();
    seed_billing(&persistence);

    let mut client = client_with_invoices(&persistence);
    client.load(1).unwrap();
    let invoices = client.ref_("invoices").unwrap();
    assert_eq!(invoices.count().unwrap(), 2);

    let totals: Vec<Value> = invoices
        .export()
        .unwrap()
        .into_iter()
        .map(|row| row["total"].clone())
        .collect();
    assert_eq!(totals, vec![Value::F64(10.5), Value::F64(20.25)]);
}

#[test]
fn unloaded_traversal_spans_the_dataset() {
    let persistence = sqlite();
    seed_billing(&persistence);

    let mut dataset = client_with_invoices(&persistence);
    dataset.add_condition(("name", "Vernon"));
    let invoices = dataset.ref_("invoices").unwrap();
    assert_eq!(invoices.count().unwrap(), 2);

    let rendered = invoices
        .action(Action::Count)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select count(*) from \"invoice\" where \"client_id\" in \
         (select \"id\" from \"client\" where \"name\" = :a)"
    );
}

#[test]
fn count_aggregate_becomes_a_correlated_column() {
    let persistence = sqlite();
    seed_billing(&persistence);

    let mut client = client_with_invoices(&persistence);
    client
        .add_aggregate("invoices", "invoice_count", FieldType::Integer, Aggregate::Count)
        .unwrap();

    let rendered = client
        .action(Action::Select)
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(
        rendered.sql,
        "select \"id\", \"name\", (select count(*) from \"invoice\" \
         where \"invoice\".\"client_id\" = \"client\".\"id\") \"invoice_count\" \
         from \"client\""
    );

    client.load(1).unwrap();
    assert_eq!(client.get("invoice_count").unwrap(), Value::I64(2));
    client.load(2).unwrap();
    assert_eq!(client.get("invoice_count").unwrap(), Value::I64(1));
}

#[test]
fn sum_aggregate_carries_the_field_type() {
    let persistence = sqlite();
    seed_billing(&persistence);

    let mut client = client_with_invoices(&persistence);
    client
        .add_aggregate(
            "invoices",
            "invoiced",
            FieldType::Money,
            Aggregate::Sum("total".to_string()),
        )
        .unwrap();

    client.load(1).unwrap();
    assert_eq!(client.get("invoiced").unwrap(), Value::F64(30.75));
}

#[test]
fn aggregates_over_an_empty_link_read_null() {
    let persistence = sqlite();
    billing_schema(&persistence);
    let plain = client_model(&persistence);
    plain.insert(row(&[("name", Value::from("Idle"))])).unwrap();

    let mut client = client_with_invoices(&persistence);
    client
        .add_aggregate(
            "invoices",
            "invoiced",
            FieldType::Money,
            Aggregate::Sum("total".to_string()),
        )
        .unwrap();

    client.load(1).unwrap();
    assert_eq!(client.get("invoiced").unwrap(), Value::Null);
}

#[test]
fn aggregate_fields_are_read_only() {
    let persistence = sqlite();
    billing_schema(&persistence);

    let mut client = client_with_invoices(&persistence);
    client
        .add_aggregate("invoices", "invoice_count", FieldType::Integer, Aggregate::Count)
        .unwrap();

    assert!(client.set("invoice_count", 7).unwrap_err().is_configuration());
}

#[test]
fn fx_runs_an_aggregate_over_the_dataset() {
    let persistence = sqlite();
    seed_billing(&persistence);

    let invoice = invoice_model(&persistence);
    assert_eq!(invoice.fx("sum", "total").unwrap(), Value::F64(35.75));
    assert_eq!(invoice.fx("max", "total").unwrap(), Value::F64(20.25));

    let mut mine = invoice_model(&persistence);
    mine.add_condition(("client_id", 2));
    assert_eq!(mine.fx("sum", "total").unwrap(), Value::F64(5.0));
}

#[test]
fn fx0_coalesces_an_empty_dataset_to_zero() {
    let persistence = sqlite();
    billing_schema(&persistence);

    let invoice = invoice_model(&persistence);
    assert_eq!(invoice.fx("sum", "total").unwrap(), Value::Null);
    assert_eq!(invoice.fx0("sum", "total").unwrap(), Value::I64(0));

    let rendered = invoice
        .action(Action::Fx {
            fx: "sum".to_string(),
            field: "total".to_string(),
            coalesce: true,
        })
        .unwrap()
        .render(Dialect::Sqlite)
        .unwrap();
    assert_eq!(rendered.sql, "select coalesce(sum(\"total\"), 0) from \"invoice\"");
}

#[test]
fn fx_rejects_a_malformed_function_name() {
    let persistence = sqlite();
    billing_schema(&persistence);

    let invoice = invoice_model(&persistence);
    let err = invoice.fx("sum(", "total").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn traversal_and_fx_compose() {
    let persistence = sqlite();
    seed_billing(&persistence);

    let mut client = client_with_invoices(&persistence);
    client.load(1).unwrap();
    let invoices = client.ref_("invoices").unwrap();
    assert_eq!(invoices.fx("min", "total").unwrap(), Value::F64(10.5));
    assert_eq!(invoices.fx("count", "id").unwrap(), Value::I64(2));
}

#[test]
fn their_field_override_is_validated() {
    let persistence = sqlite();
    billing_schema(&persistence);

    // the conventional their-field name would be "client_id"; an override
    // pointing at a missing field fails at traversal time
    let mut wrong = client_model(&persistence);
    wrong
        .add_reference(
            griddle::Reference::has_many("invoices", invoice_model(&persistence))
                .with_their_field("customer_id"),
        )
        .unwrap();
    let err = wrong.ref_("invoices").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("customer_id"));
}

#[test]
fn unloaded_traversal_with_conditions_matches_in_memory_filtering() {
    let persistence = sqlite();
    seed_billing(&persistence);

    let mut dataset = client_with_invoices(&persistence);
    dataset.add_condition(("name", Operator::In, vec!["Vernon", "Ace"]));
    let invoices = dataset.ref_("invoices").unwrap();
    assert_eq!(invoices.count().unwrap(), 3);
}
