mod common;

use dochandle::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Account {
    #[serde(rename = "accountHolder")]
    account_holder: String,
    balance: i64,
}

#[tokio::test]
async fn inserted_documents_are_found_again() {
    let (_driver, _registry, accounts) = common::accounts().await;

    let inserted = QueryHelper::insert_one(&accounts, doc! { "accountHolder": "A", "balance": 100 })
        .await
        .unwrap();
    let id = inserted.inserted_id().cloned().unwrap();

    let found = QueryHelper::find_first(&accounts, &Filter::eq("accountHolder", "A"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found, doc! { "_id": id.clone(), "accountHolder": "A", "balance": 100 });
    assert_eq!(
        QueryHelper::find_first(&accounts, &Filter::id(id)).await.unwrap(),
        Some(found)
    );
}

#[tokio::test]
async fn increment_updates_the_stored_balance() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_one(&accounts, doc! { "accountHolder": "A", "balance": 100 })
        .await
        .unwrap();

    let result = QueryHelper::update_one(&accounts, &Filter::eq("accountHolder", "A"), &Update::inc("balance", 50))
        .await
        .unwrap();
    assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });

    let account = QueryHelper::find_first_as::<_, Account>(&accounts, &Filter::eq("accountHolder", "A"))
        .await
        .unwrap();
    assert_eq!(account, Some(Account { account_holder: "A".into(), balance: 150 }));
}

#[tokio::test]
async fn updates_matching_nothing_are_not_errors() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_one(&accounts, doc! { "accountHolder": "A", "balance": 100 })
        .await
        .unwrap();

    let result = QueryHelper::update_one(&accounts, &Filter::eq("accountHolder", "Z"), &Update::set("balance", 0))
        .await
        .unwrap();

    assert_eq!(result, UpdateResult { matched_count: 0, modified_count: 0 });
    assert!(QueryHelper::find_first(&accounts, &Filter::eq("accountHolder", "Z")).await.unwrap().is_none());
}

#[tokio::test]
async fn update_many_and_empty_updates() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(
        &accounts,
        vec![
            doc! { "accountHolder": "A", "tier": "basic" },
            doc! { "accountHolder": "B", "tier": "basic" },
            doc! { "accountHolder": "C", "tier": "gold" },
        ],
    )
    .await
    .unwrap();

    let result = QueryHelper::update_many(&accounts, &Filter::eq("tier", "basic"), &Update::set("tier", "silver"))
        .await
        .unwrap();
    assert_eq!(result, UpdateResult { matched_count: 2, modified_count: 2 });

    let err = QueryHelper::update_one(&accounts, &Filter::all(), &UpdateSpec::default())
        .await
        .unwrap_err();
    match err {
        DocumentStoreError::Write { operation, source, .. } => {
            assert_eq!(operation, Operation::UpdateOne);
            assert_eq!(source.kind, DriverErrorKind::Validation);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn rejected_increment_is_a_write_error() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_one(&accounts, doc! { "accountHolder": "A", "balance": "lots" })
        .await
        .unwrap();

    let err = QueryHelper::update_one(&accounts, &Filter::eq("accountHolder", "A"), &Update::inc("balance", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::Write { operation: Operation::UpdateOne, .. }));
    assert!(err.to_string().contains("accountHolder"));
}

#[tokio::test]
async fn delete_many_requires_confirmation_for_unconstrained_filters() {
    let (driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(
        &accounts,
        vec![
            doc! { "accountHolder": "A" },
            doc! { "accountHolder": "B" },
            doc! { "accountHolder": "C" },
        ],
    )
    .await
    .unwrap();

    let err = QueryHelper::delete_many(&accounts, &Filter::all(), DeleteGuard::Constrained)
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::UnconstrainedDelete(ref ns) if ns == "bank.accounts"));
    assert_eq!(QueryHelper::count_documents(&accounts, &Filter::all()).await.unwrap(), 3);

    let deleted = QueryHelper::delete_many(&accounts, &Filter::all(), DeleteGuard::ConfirmUnconstrained)
        .await
        .unwrap();
    assert_eq!(deleted.deleted_count, 3);
    assert!(QueryHelper::find_all(&accounts, &Filter::all()).await.unwrap().is_empty());

    driver.tracker().check().unwrap();
}

#[tokio::test]
async fn filters_that_always_match_need_confirmation_to_delete() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(
        &accounts,
        vec![
            doc! { "accountHolder": "A" },
            doc! { "accountHolder": "B" },
            doc! { "accountHolder": "C" },
        ],
    )
    .await
    .unwrap();

    for filter in [
        Filter::or(Vec::new()).not(),
        Filter::all().not().not(),
        Filter::exists("_id"),
        Filter::or([Filter::eq("accountHolder", "A"), Filter::exists("_id")]),
    ] {
        let err = QueryHelper::delete_many(&accounts, &filter, DeleteGuard::Constrained)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::UnconstrainedDelete(_)), "{filter} was not refused");
    }

    assert_eq!(QueryHelper::count_documents(&accounts, &Filter::all()).await.unwrap(), 3);
}

#[tokio::test]
async fn constrained_deletes_remove_only_matches() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(
        &accounts,
        vec![
            doc! { "accountHolder": "A", "closed": true },
            doc! { "accountHolder": "B", "closed": true },
            doc! { "accountHolder": "C", "closed": false },
        ],
    )
    .await
    .unwrap();

    let one = QueryHelper::delete_one(&accounts, &Filter::eq("closed", true)).await.unwrap();
    assert_eq!(one.deleted_count, 1);

    let rest = QueryHelper::delete_many(&accounts, &Filter::eq("closed", true), DeleteGuard::Constrained)
        .await
        .unwrap();
    assert_eq!(rest.deleted_count, 1);

    let remaining = QueryHelper::find_all(&accounts, &Filter::all()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].get("accountHolder"), Some(&Bson::String("C".into())));
}

#[tokio::test]
async fn duplicate_ids_are_write_errors() {
    let (_driver, _registry, accounts) = common::accounts().await;
    let document = DocumentBuilder::new().with_object_id().append("accountHolder", "A").build();

    QueryHelper::insert_one(&accounts, document.clone()).await.unwrap();
    let err = QueryHelper::insert_one(&accounts, document).await.unwrap_err();

    match err {
        DocumentStoreError::Write { operation, target, source } => {
            assert_eq!(operation, Operation::InsertOne);
            assert_eq!(target, "bank.accounts");
            assert_eq!(source.kind, DriverErrorKind::DuplicateKey);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn insert_many_keeps_documents_before_the_failure() {
    let (_driver, _registry, accounts) = common::accounts().await;

    let err = QueryHelper::insert_many(
        &accounts,
        vec![doc! { "_id": "a" }, doc! { "_id": "a" }, doc! { "_id": "b" }],
    )
    .await
    .unwrap_err();

    match err {
        DocumentStoreError::Write { source, .. } => assert_eq!(source.inserted, Some(1)),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(QueryHelper::count_documents(&accounts, &Filter::all()).await.unwrap(), 1);
    assert_eq!(
        QueryHelper::insert_many(&accounts, Vec::new()).await.unwrap(),
        InsertResult::default()
    );
}

#[tokio::test]
async fn range_filters_select_inclusive_bounds() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(&accounts, [5, 10, 15, 20, 25].map(|n| doc! { "this": n }).to_vec())
        .await
        .unwrap();

    let filter = Filter::gte("this", 10).and(Filter::lte("this", 20));
    let found = QueryHelper::find_all(&accounts, &filter).await.unwrap();

    let values = found.iter().filter_map(|d| d.get("this").cloned()).collect::<Vec<_>>();
    assert_eq!(values, vec![Bson::Int32(10), Bson::Int32(15), Bson::Int32(20)]);
}

#[tokio::test]
async fn find_all_with_sorts_and_paginates() {
    let (_driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(
        &accounts,
        vec![
            doc! { "accountHolder": "A", "balance": 30 },
            doc! { "accountHolder": "B", "balance": 10 },
            doc! { "accountHolder": "C", "balance": 20 },
        ],
    )
    .await
    .unwrap();

    let query = Query::builder().sort("balance", SortDirection::Asc).offset(1).limit(5).build();
    let holders = QueryHelper::find_all_with(&accounts, &query)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|d| d.get("accountHolder").cloned())
        .collect::<Vec<_>>();

    assert_eq!(holders, vec![Bson::String("C".into()), Bson::String("A".into())]);

    let accounts_as = QueryHelper::find_all_as::<_, Account>(&accounts, &Filter::gt("balance", 15))
        .await
        .unwrap();
    assert_eq!(accounts_as.len(), 2);
}

#[tokio::test]
async fn for_each_visits_every_match_and_closes_the_cursor() {
    let (driver, _registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(&accounts, (1..=4).map(|n| doc! { "n": n }).collect())
        .await
        .unwrap();

    let mut seen = Vec::new();
    let visited = QueryHelper::for_each(&accounts, &Filter::gt("n", 1), |document| {
        seen.push(document.get("n").cloned());
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(visited, 3);
    assert_eq!(seen.len(), 3);

    let err = QueryHelper::for_each(&accounts, &Filter::all(), |_| {
        Err(DocumentStoreError::Serialization("stop".into()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, DocumentStoreError::Serialization(_)));

    driver.tracker().check().unwrap();
}

#[tokio::test]
async fn aggregates_inspection_results() {
    let (driver, registry, _) = common::accounts().await;
    let database = registry.get_database("sample_restaurants").await.unwrap();
    let inspections = registry.get_collection(&database, "inspections");

    QueryHelper::insert_many(
        &inspections,
        vec![
            DocumentBuilder::inspection("10021-2015-ENFO", "no violation"),
            DocumentBuilder::inspection("10057-2015-ENFO", "violation"),
            DocumentBuilder::inspection("10084-2015-ENFO", "no violation"),
        ],
    )
    .await
    .unwrap();

    let pipeline = vec![
        Stage::Match(Filter::ends_with("business_id", "-ENFO")),
        Stage::group(Some("result")).accumulate("total", Accumulator::Count),
        Stage::Sort("total".into(), SortDirection::Desc),
    ];
    let groups = QueryHelper::aggregate_all(&inspections, &pipeline).await.unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0], doc! { "_id": "no violation", "total": 2 });
    assert_eq!(groups[1], doc! { "_id": "violation", "total": 1 });

    let mut cursor = QueryHelper::aggregate(&inspections, &[Stage::Count("n".into())]).await.unwrap();
    assert_eq!(cursor.next().await.unwrap(), Some(doc! { "n": 3 }));
    cursor.close().await.unwrap();

    driver.tracker().check().unwrap();
}
