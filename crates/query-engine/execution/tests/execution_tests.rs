mod common;

use query_engine_execution::connection::{RequestContext, ResultSet};
use query_engine_execution::error::Error;
use query_engine_execution::materialize::deserialize_objects;
use query_engine_execution::metrics::Phase;
use query_engine_execution::query::{execute, execute_count};
use query_engine_sql::sql::ast::SelectList;
use query_engine_translation::translation::query::translate_count;
use query_engine_translation::translation::query::CountRequest;
use query_engine_translation::translation::request::{Selection, Variables};
use serde_json::{json, Value};

use common::MemoryDatabase;

fn objects(database: &MemoryDatabase, selection: Selection) -> Vec<Value> {
    let plan = common::plan(selection);
    execute(database, &RequestContext::new(), &common::metrics(), &plan)
        .unwrap()
        .into_iter()
        .map(Value::Object)
        .collect()
}

#[test]
fn sibling_collections_are_read_from_their_own_result_sets() {
    let database = MemoryDatabase::new(vec![
        ResultSet::from_values(
            &["__Text", "__Id", "__OwnerId"],
            vec![
                vec![json!("milk"), json!("1"), json!("u1")],
                vec![json!("eggs"), json!("2"), Value::Null],
            ],
        ),
        ResultSet::from_values(
            &["FK___Id", "a_Name", "a_Id"],
            vec![
                vec![json!("1"), json!("shop"), json!(10)],
                vec![json!("1"), json!("dairy"), json!(11)],
                vec![json!("2"), Value::Null, Value::Null],
            ],
        ),
        ResultSet::from_values(
            &["FK___OwnerId", "b_Name", "b_Id"],
            vec![
                vec![json!("u1"), json!("Ann"), json!("u1")],
                vec![Value::Null, Value::Null, Value::Null],
            ],
        ),
    ]);

    let result = objects(
        &database,
        Selection::new("toDos")
            .field("text")
            .field(Selection::new("tags").field("name"))
            .field(Selection::new("owner").field("name")),
    );

    similar_asserts::assert_eq!(
        result,
        vec![
            json!({
                "Text": "milk",
                "Tags": [{ "Name": "shop" }, { "Name": "dairy" }],
                "Owner": { "Name": "Ann" }
            }),
            json!({ "Text": "eggs", "Tags": [], "Owner": null }),
        ]
    );
    assert_eq!(database.queries().len(), 1);
    assert_eq!(database.open_connections(), 0);
}

#[test]
fn rows_in_the_shape_of_the_generated_statement_are_rebuilt() {
    let selection = Selection::new("toDos").field("text").field(
        Selection::new("owner")
            .field("name")
            .field(Selection::new("toDos").field("text")),
    );
    let plan = common::plan(selection.clone());

    let columns: Vec<String> = match &plan.statements.0[..] {
        [statement] => match &statement.select_list {
            SelectList::SelectList(columns) => {
                columns.iter().map(|(alias, _)| alias.name.clone()).collect()
            }
            other => panic!("unexpected select list {other:?}"),
        },
        statements => panic!("expected one statement, got {}", statements.len()),
    };
    assert_eq!(
        columns,
        vec![
            "__Text", "__OwnerId", "__Id", "FK___OwnerId", "a_Name", "a_Id", "FK_a_Id",
            "b_Text", "b_Id",
        ]
    );

    // one row per to-do, owner and to-do of that owner
    let row = |todo: (&str, &str), owner: (&str, &str), owned: (&str, &str)| {
        vec![
            json!(todo.0),
            json!(owner.0),
            json!(todo.1),
            json!(owner.0),
            json!(owner.1),
            json!(owner.0),
            json!(owner.0),
            json!(owned.0),
            json!(owned.1),
        ]
    };
    let ann = ("u1", "Ann");
    let bob = ("u2", "Bob");
    let milk = ("milk", "t1");
    let eggs = ("eggs", "t2");
    let bread = ("bread", "t3");
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &columns,
        vec![
            row(milk, ann, milk),
            row(milk, ann, eggs),
            row(eggs, ann, milk),
            row(eggs, ann, eggs),
            row(bread, bob, bread),
        ],
    )]);

    let result = objects(&database, selection);

    let owned_by_ann = json!([{ "Text": "milk" }, { "Text": "eggs" }]);
    similar_asserts::assert_eq!(
        result,
        vec![
            json!({ "Text": "milk", "Owner": { "Name": "Ann", "ToDos": owned_by_ann } }),
            json!({ "Text": "eggs", "Owner": { "Name": "Ann", "ToDos": owned_by_ann } }),
            json!({ "Text": "bread", "Owner": { "Name": "Bob", "ToDos": [{ "Text": "bread" }] } }),
        ]
    );
}

#[test]
fn shared_children_appear_under_every_parent() {
    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &["__Text", "__Id", "FK___Id", "a_Title", "a_Id"],
        vec![
            vec![json!("milk"), json!("1"), json!("1"), json!("red"), json!(1)],
            vec![json!("milk"), json!("1"), json!("1"), json!("blue"), json!(2)],
            vec![json!("eggs"), json!("2"), json!("2"), json!("red"), json!(1)],
        ],
    )]);

    let result = objects(
        &database,
        Selection::new("toDos")
            .field("text")
            .field(Selection::new("labels").field("title")),
    );

    similar_asserts::assert_eq!(
        result,
        vec![
            json!({ "Text": "milk", "Labels": [{ "Title": "red" }, { "Title": "blue" }] }),
            json!({ "Text": "eggs", "Labels": [{ "Title": "red" }] }),
        ]
    );
}

#[test]
fn enums_and_bits_are_converted() {
    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &["__Priority", "__Completed", "__Id"],
        vec![vec![json!(2), json!(1), json!("1")]],
    )]);

    let result = objects(
        &database,
        Selection::new("toDos").field("priority").field("completed"),
    );

    assert_eq!(result, vec![json!({ "Priority": "High", "Completed": true })]);
}

#[test]
fn grouped_rows_are_objects_of_their_own() {
    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &["ROW_NUM", "__Completed", "___count"],
        vec![
            vec![json!(1), json!(1), json!(3)],
            vec![json!(2), json!(0), json!(5)],
        ],
    )]);

    let result = objects(
        &database,
        Selection::new("toDos").field("completed").field("_count"),
    );

    assert_eq!(
        result,
        vec![
            json!({ "Completed": true, "_count": 3 }),
            json!({ "Completed": false, "_count": 5 }),
        ]
    );
}

#[test]
fn a_parent_without_columns_still_carries_its_aggregates() {
    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &["ROW_NUM", "a__count"],
        vec![vec![json!(1), json!(4)]],
    )]);

    let result = objects(
        &database,
        Selection::new("toDos").field(Selection::new("tags").field("_count")),
    );

    assert_eq!(result, vec![json!({ "Tags": [{ "_count": 4 }] })]);
}

#[test]
fn objects_can_be_read_into_types() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct ToDo {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "Tags")]
        tags: Vec<Tag>,
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Tag {
        #[serde(rename = "Name")]
        name: String,
    }

    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &["__Text", "__Id", "FK___Id", "a_Name", "a_Id"],
        vec![vec![json!("milk"), json!("1"), json!("1"), json!("shop"), json!(10)]],
    )]);
    let plan = common::plan(
        Selection::new("toDos")
            .field("text")
            .field(Selection::new("tags").field("name")),
    );

    let objects = execute(&database, &RequestContext::new(), &common::metrics(), &plan).unwrap();
    let todos: Vec<ToDo> = deserialize_objects("ToDo", objects).unwrap();

    assert_eq!(
        todos,
        vec![ToDo {
            text: "milk".to_string(),
            tags: vec![Tag {
                name: "shop".to_string()
            }],
        }]
    );
}

#[test]
fn backend_failures_carry_the_query() {
    let database = MemoryDatabase::failing("deadlock");
    let metrics = common::metrics();
    let plan = common::plan(
        Selection::new("toDos")
            .field("text")
            .argument("completed", json!(true)),
    );

    let error = execute(&database, &RequestContext::new(), &metrics, &plan).unwrap_err();

    match &error {
        Error::Backend { sql, params, .. } => {
            assert_eq!(sql, &database.queries()[0]);
            assert_eq!(
                params,
                r#"{"@__completed":{"value":true,"wire_type":"Bit"}}"#
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(error.to_string().ends_with(" => deadlock"));
    assert_eq!(database.open_connections(), 0);
    assert_eq!(metrics.error_total.get(), 1);
    assert_eq!(metrics.query_total.get(), 0);
}

#[test]
fn bad_values_fail_the_whole_request() {
    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &["__Priority", "__Id"],
        vec![vec![json!(7), json!("1")]],
    )]);
    let metrics = common::metrics();
    let plan = common::plan(Selection::new("toDos").field("priority"));

    let error = execute(&database, &RequestContext::new(), &metrics, &plan).unwrap_err();

    assert_eq!(
        error.to_string(),
        "Failed to set property 'Priority' of 'ToDo': 7 is not one of the 3 variants"
    );
    assert_eq!(database.open_connections(), 0);
    assert_eq!(metrics.error_total.get(), 1);
    assert_eq!(metrics.phase_count(Phase::Materialize), 1);
}

#[test]
fn counts_read_the_count_column() {
    let database = MemoryDatabase::new(vec![ResultSet::from_values(
        &["count"],
        vec![vec![json!(42)]],
    )]);
    let metrics = common::metrics();
    let request = CountRequest {
        entity: "ToDo".to_string(),
        parent: Selection::new("page")
            .field("total")
            .field(
                Selection::new("items")
                    .field("text")
                    .argument("_fetchCount", json!(5)),
            ),
        count_field: "total".to_string(),
        variables: Variables::new(),
    };
    let plan = translate_count(&common::registry(), &request).unwrap();

    let count = execute_count(&database, &RequestContext::new(), &metrics, &plan).unwrap();

    assert_eq!(count, 42);
    assert_eq!(metrics.count_total.get(), 1);
    assert_eq!(
        database.queries(),
        vec!["SELECT COUNT(*) AS [count] FROM [ToDo] AS [_] WITH (NOLOCK)".to_string()]
    );
}
