use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};

use taxi_dashboard::controller::{Activation, View, ViewController};
use taxi_dashboard::error::{ExportError, FetchError};
use taxi_dashboard::gateway::{DataSource, Resource, TripFilter};
use taxi_dashboard::output::WidgetBody;
use taxi_dashboard::types::StatDataset;

/// In-memory API that counts requests per cache key.
#[derive(Default)]
struct FakeApi {
    calls: Mutex<HashMap<String, usize>>,
    failing: Vec<&'static str>,
    trips_gate: Option<Arc<Semaphore>>,
    trips_started: Notify,
}

impl FakeApi {
    fn failing(paths: &[&'static str]) -> Self {
        Self {
            failing: paths.to_vec(),
            ..Default::default()
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            trips_gate: Some(gate),
            ..Default::default()
        }
    }

    fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn payload(resource: &Resource) -> Value {
        match resource {
            Resource::Summary => json!({
                "total_trips": 300,
                "total_revenue": 4500.5,
                "avg_fare": 15.0,
                "avg_speed": 11.25
            }),
            Resource::HourlyPatterns => Value::Array(
                (0..24u32)
                    .map(|hour| {
                        let fare = match hour {
                            7..=9 => 22.0,
                            10..=15 => 15.0,
                            _ => 12.0,
                        };
                        json!({ "hour": hour, "trip_count": 10, "avg_fare": fare })
                    })
                    .collect(),
            ),
            Resource::BoroughRevenue => json!([
                { "borough": "Manhattan", "trip_count": 200, "total_revenue": 3000.0 },
                { "borough": "Brooklyn", "trip_count": 60, "total_revenue": 900.0 },
                { "borough": "Queens", "trip_count": 40, "total_revenue": 600.5 }
            ]),
            Resource::DailyRevenue => json!([
                { "date": "2024-01-01", "total_revenue": 1500.0 },
                { "date": "2024-01-02", "total_revenue": 3000.5 }
            ]),
            Resource::TimeCategories => json!([
                { "time_category": "late_night", "avg_fare": 14.0, "avg_speed": 18.0 },
                { "time_category": "morning_rush", "avg_fare": 22.0, "avg_speed": 9.0 },
                { "time_category": "midday", "avg_fare": 15.0, "avg_speed": 12.0 }
            ]),
            Resource::TopRoutes => json!([
                { "route": "Midtown -> JFK", "trip_count": 12 },
                { "route": "SoHo -> Midtown", "trip_count": 30 }
            ]),
            Resource::Trips(query) => Value::Array(
                (0..2u64)
                    .map(|i| {
                        json!({
                            "id": query.offset + i + 1,
                            "tpep_pickup_datetime": "2024-01-05T08:15:00",
                            "pickup_borough": "Manhattan",
                            "dropoff_borough": "Queens",
                            "trip_distance": 3.5,
                            "fare_amount": 14.5,
                            "speed_mph": 11.0
                        })
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl DataSource for FakeApi {
    async fn fetch(&self, resource: &Resource) -> Result<StatDataset, FetchError> {
        let key = resource.cache_key();
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;

        if let (Resource::Trips(_), Some(gate)) = (resource, &self.trips_gate) {
            self.trips_started.notify_one();
            let _permit = gate.acquire().await.unwrap();
        }
        if self.failing.contains(&resource.path()) {
            return Err(FetchError::Status {
                resource: resource.to_string(),
                status: 503,
            });
        }
        Ok(StatDataset::new(key, Self::payload(resource)))
    }
}

fn controller(api: &Arc<FakeApi>) -> ViewController {
    ViewController::new(api.clone(), 50)
}

fn rendered(activation: Activation) -> Arc<taxi_dashboard::output::ViewFrame> {
    match activation {
        Activation::Rendered(frame) => frame,
        other => panic!("expected a rendered frame, got {other:?}"),
    }
}

#[tokio::test]
async fn overview_survives_one_failing_dataset() {
    let api = Arc::new(FakeApi::failing(&["/stats/borough-revenue"]));
    let controller = controller(&api);

    let frame = rendered(controller.activate(View::Overview).await);

    assert_eq!(frame.view, "overview");
    assert!(frame.widget("summary-stats").unwrap().is_available());
    assert!(frame.widget("hourly-chart").unwrap().is_available());
    let borough = frame.widget("borough-chart").unwrap();
    match &borough.body {
        WidgetBody::Unavailable { reason } => assert!(reason.contains("503"), "{reason}"),
        other => panic!("expected unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn insights_survive_one_failing_dataset() {
    let api = Arc::new(FakeApi::failing(&["/stats/hourly-patterns"]));
    let controller = controller(&api);

    let frame = rendered(controller.activate(View::Insights).await);

    assert!(!frame.widget("peak-fare-insight").unwrap().is_available());
    assert!(!frame.widget("peak-fare-chart").unwrap().is_available());
    for id in [
        "borough-share-insight",
        "borough-share-chart",
        "speed-variance-insight",
        "speed-variance-chart",
    ] {
        assert!(frame.widget(id).unwrap().is_available(), "{id}");
    }
}

#[tokio::test]
async fn failed_trip_page_leaves_routes_and_nothing_to_export() {
    let api = Arc::new(FakeApi::failing(&["/trips"]));
    let controller = controller(&api);

    let frame = rendered(controller.activate(View::Data).await);

    assert!(!frame.widget("data-table").unwrap().is_available());
    assert!(frame.widget("routes-list").unwrap().is_available());
    assert!(frame.widget("page-info").unwrap().is_available());
    assert!(matches!(controller.export(), Err(ExportError::NothingToExport)));
    assert!(controller.trip_detail(0).is_none());
}

#[tokio::test]
async fn summary_is_formatted_for_display() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    let frame = rendered(controller.activate(View::Overview).await);

    let WidgetBody::Table { rows, .. } = &frame.widget("summary-stats").unwrap().body else {
        panic!("summary should be a table");
    };
    assert_eq!(rows[0].cells, ["Total Trips", "300"]);
    assert_eq!(rows[1].cells, ["Total Revenue", "$4,500.50"]);
}

#[tokio::test]
async fn datasets_shared_between_views_are_fetched_once() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    controller.activate(View::Overview).await;
    controller.activate(View::Insights).await;
    controller.activate(View::Overview).await;

    assert_eq!(api.calls("/stats/hourly-patterns"), 1);
    assert_eq!(api.calls("/stats/borough-revenue"), 1);
    assert_eq!(api.calls("/stats/time-categories"), 1);
}

#[tokio::test]
async fn refresh_refetches_the_active_view() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    controller.activate(View::Trends).await;
    let frame = rendered(controller.refresh().await);

    assert_eq!(frame.view, "trends");
    assert_eq!(api.calls("/stats/daily-revenue"), 2);
    assert_eq!(api.calls("/stats/time-categories"), 2);
}

#[tokio::test]
async fn insights_report_premium_and_share() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    let frame = rendered(controller.activate(View::Insights).await);

    let headline = |id: &str| match &frame.widget(id).unwrap().body {
        WidgetBody::Narrative { headline, .. } => headline.clone(),
        other => panic!("{id} should be a narrative, got {other:?}"),
    };
    assert_eq!(headline("peak-fare-insight"), "+46.7%");
    assert_eq!(headline("borough-share-insight"), "66.7%");
    assert_eq!(headline("speed-variance-insight"), "+100.0%");
    assert!(frame.widget("speed-variance-chart").unwrap().is_available());
}

#[tokio::test]
async fn paging_moves_the_offset_and_stops_at_the_first_page() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    controller.activate(View::Data).await;
    let frame = rendered(controller.next_page().await);

    assert_eq!(controller.page(), 2);
    assert_eq!(api.calls("/trips?limit=50&offset=50"), 1);
    match &frame.widget("page-info").unwrap().body {
        WidgetBody::Text { text } => assert_eq!(text, "Page 2"),
        other => panic!("unexpected page info {other:?}"),
    }

    controller.prev_page().await;
    controller.prev_page().await;

    assert_eq!(controller.page(), 1);
    assert_eq!(api.calls("/trips?limit=50&offset=0"), 2);
}

#[tokio::test]
async fn routes_are_ranked_by_trip_count() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    let frame = rendered(controller.activate(View::Data).await);

    let WidgetBody::Table { rows, .. } = &frame.widget("routes-list").unwrap().body else {
        panic!("routes should be a table");
    };
    assert_eq!(rows[0].cells, ["SoHo -> Midtown", "30 trips"]);
    assert_eq!(rows[1].cells, ["Midtown -> JFK", "12 trips"]);
}

#[tokio::test]
async fn filter_resets_to_the_first_page() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    controller.next_page().await;
    let filter = TripFilter {
        pickup_zone: Some("Midtown".to_string()),
        ..Default::default()
    };
    controller.apply_filter(filter.clone()).await;

    assert_eq!(controller.page(), 1);
    assert_eq!(controller.filter(), filter);
    assert_eq!(api.calls("/trips?limit=50&offset=0&pickup_zone=Midtown"), 1);
}

#[tokio::test]
async fn export_uses_the_trips_on_screen() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    assert!(matches!(controller.export(), Err(ExportError::NothingToExport)));

    controller.activate(View::Data).await;
    controller.activate(View::Overview).await;
    let payload = controller.export().unwrap();

    let mut lines = payload.content.lines();
    assert_eq!(lines.next(), Some("ID,Time,Pickup,Dropoff,Distance,Fare,Speed"));
    assert_eq!(lines.next(), Some("1,2024-01-05T08:15:00,Manhattan,Queens,3.5,14.5,11"));
    assert!(payload.file_name.starts_with("nyc-taxi-"));
}

#[tokio::test]
async fn trip_detail_reads_the_current_page() {
    let api = Arc::new(FakeApi::default());
    let controller = controller(&api);

    assert!(controller.trip_detail(0).is_none());
    controller.activate(View::Data).await;

    let rows = controller.trip_detail(1).unwrap();
    assert_eq!(rows[0].cells, ["ID", "2"]);
    assert_eq!(rows[1].cells, ["Pickup", "Manhattan - --"]);
    assert!(controller.trip_detail(5).is_none());
}

#[tokio::test]
async fn slow_data_view_does_not_overwrite_a_newer_view() {
    let gate = Arc::new(Semaphore::new(0));
    let api = Arc::new(FakeApi::gated(gate.clone()));
    let controller = Arc::new(controller(&api));

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.activate(View::Data).await }
    });
    api.trips_started.notified().await;

    let overview = rendered(controller.activate(View::Overview).await);
    gate.add_permits(1);
    let stale = pending.await.unwrap();

    assert_eq!(stale, Activation::Superseded { view: View::Data });
    assert_eq!(overview.view, "overview");
    assert_eq!(controller.current_frame().unwrap().view, "overview");
    assert_eq!(controller.active_view(), View::Overview);
    assert!(matches!(controller.export(), Err(ExportError::NothingToExport)));
}
