use chrono::NaiveDate;
use hab_data_api::adapters::GridDataClient;
use hab_data_api::domain::ports::GridPriceSource;
use hab_data_api::HabError;
use httpmock::prelude::*;
use serde_json::json;

#[tokio::test]
async fn test_fetches_day_and_converts_to_local_cents() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/auctionresultsqh/2024-05-02");
        then.status(200).json_body(json!([
            {"dateTime": "2024-05-01T22:00:00Z", "price": 95.3, "isVisible": true},
            {"dateTime": "2024-05-01T22:15:00Z", "price": -4.0},
            {"dateTime": "2024-05-01T22:30:00Z", "price": null}
        ]));
    });

    let client = GridDataClient::new(&server.url("/auctionresultsqh/"));
    let prices = client
        .grid_prices(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
        .await
        .unwrap();

    mock.assert();
    assert_eq!(prices.len(), 2);
    assert_eq!(prices[0].timestamp.to_rfc3339(), "2024-05-02T00:00:00+02:00");
    assert!((prices[0].value - 9.53).abs() < 1e-9);
    assert!((prices[1].value + 0.4).abs() < 1e-9);
    assert_eq!(prices[1].unit, "c€/kWh");
}

#[tokio::test]
async fn test_unpublished_day_is_empty() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/auctionresultsqh/2024-05-03");
        then.status(200).json_body(json!([]));
    });

    let client = GridDataClient::new(&server.url("/auctionresultsqh"));
    let prices = client
        .grid_prices(NaiveDate::from_ymd_opt(2024, 5, 3).unwrap())
        .await
        .unwrap();

    assert!(prices.is_empty());
}

#[tokio::test]
async fn test_error_status_is_grid_data_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/auctionresultsqh/2024-05-03");
        then.status(503);
    });

    let client = GridDataClient::new(&server.url("/auctionresultsqh"));
    let error = client
        .grid_prices(NaiveDate::from_ymd_opt(2024, 5, 3).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(error, HabError::GridDataError { .. }));
    assert!(error.is_upstream());
}
