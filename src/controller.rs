//! The view controller: decides what each view needs, fetches it through the
//! session cache, and turns the results into a [`ViewFrame`].
//!
//! All session state (active view, pagination, trip filter, the trip
//! snapshot used for export) lives in one [`Session`] owned by the
//! controller. Every activation takes a generation ticket; a result whose
//! ticket is no longer current is dropped instead of applied, so a slow
//! response for a view the user already left cannot overwrite the view they
//! are looking at now.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;

use crate::cache::{FetchResult, SessionCache};
use crate::error::ExportError;
use crate::export::{self, ExportPayload, EXPORT_HEADER};
use crate::gateway::{DataSource, Resource, TripFilter, TripQuery};
use crate::insights::{self, Insight, InsightStatus, Topic};
use crate::normalize::normalize_page;
use crate::output::{ChartKind, ChartSpec, ColorToken, RowSpec, ViewFrame, Widget, WidgetBody};
use crate::pagination::PaginationState;
use crate::types::{
    BoroughTotals, DailyRevenue, HourlyBucket, RouteCount, SummaryStats, TimeCategoryStat,
    TripRecord,
};
use crate::util::{
    format_count, format_currency, format_timestamp, format_with_unit, MISSING,
};

/// How many routes the Data view lists.
pub const TOP_ROUTES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Overview,
    Trends,
    Insights,
    Data,
}

impl View {
    pub const ALL: [View; 4] = [View::Overview, View::Trends, View::Insights, View::Data];

    pub fn id(self) -> &'static str {
        match self {
            View::Overview => "overview",
            View::Trends => "trends",
            View::Insights => "insights",
            View::Data => "data",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            View::Overview => "Dashboard",
            View::Trends => "Analytics",
            View::Insights => "Insights",
            View::Data => "Data Explorer",
        }
    }

    pub fn subtitle(self) -> &'static str {
        match self {
            View::Overview => "Overview of taxi operations",
            View::Trends => "Revenue and time-of-day trends",
            View::Insights => "What the numbers say",
            View::Data => "Browse trip records",
        }
    }

    fn frame(self, widgets: Vec<Widget>) -> ViewFrame {
        ViewFrame {
            view: self.id(),
            title: self.title(),
            subtitle: self.subtitle(),
            widgets,
        }
    }
}

/// Outcome of assembling a view.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Rendered(Arc<ViewFrame>),
    /// Another activation started while this one was fetching; its result
    /// was discarded.
    Superseded { view: View },
}

impl Activation {
    pub fn frame(&self) -> Option<&ViewFrame> {
        match self {
            Activation::Rendered(frame) => Some(frame),
            Activation::Superseded { .. } => None,
        }
    }
}

struct Session {
    active: View,
    generation: u64,
    pagination: PaginationState,
    filter: TripFilter,
    /// Cache key of the trip page last requested.
    trips_key: Option<String>,
    /// Trips of the page on screen, the source of every export.
    trips: Option<Arc<Vec<TripRecord>>>,
    frame: Option<Arc<ViewFrame>>,
}

impl Session {
    fn trip_query(&self) -> TripQuery {
        TripQuery {
            limit: self.pagination.page_size(),
            offset: self.pagination.offset(),
            filter: self.filter.clone(),
        }
    }
}

struct Ticket {
    view: View,
    generation: u64,
    trips: TripQuery,
    page: u64,
}

pub struct ViewController {
    source: Arc<dyn DataSource>,
    cache: SessionCache,
    session: Mutex<Session>,
}

impl ViewController {
    pub fn new(source: Arc<dyn DataSource>, page_size: u32) -> Self {
        Self {
            source,
            cache: SessionCache::new(),
            session: Mutex::new(Session {
                active: View::Overview,
                generation: 0,
                pagination: PaginationState::new(page_size),
                filter: TripFilter::default(),
                trips_key: None,
                trips: None,
                frame: None,
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn active_view(&self) -> View {
        self.session().active
    }

    pub fn page(&self) -> u64 {
        self.session().pagination.page()
    }

    pub fn filter(&self) -> TripFilter {
        self.session().filter.clone()
    }

    /// The frame of the most recent activation that was applied.
    pub fn current_frame(&self) -> Option<Arc<ViewFrame>> {
        self.session().frame.clone()
    }

    /// Make `view` the active view and assemble it.
    ///
    /// Activating the view that is already active assembles it again, which
    /// is cheap for anything still in the session cache.
    pub async fn activate(&self, view: View) -> Activation {
        let ticket = self.begin(view);
        let (frame, trips) = match view {
            View::Overview => (self.assemble_overview().await, None),
            View::Trends => (self.assemble_trends().await, None),
            View::Insights => (self.assemble_insights().await, None),
            View::Data => self.assemble_data(&ticket).await,
        };
        self.commit(ticket, frame, trips)
    }

    /// Drop every cached dataset and reassemble the active view.
    pub async fn refresh(&self) -> Activation {
        self.cache.invalidate_all();
        let view = self.active_view();
        tracing::info!("refreshing {}", view.id());
        self.activate(view).await
    }

    pub async fn next_page(&self) -> Activation {
        {
            let mut session = self.session();
            session.pagination.next_page();
            self.forget_trip_page(&mut session);
        }
        self.activate(View::Data).await
    }

    /// On the first page this stays put and reassembles the same page.
    pub async fn prev_page(&self) -> Activation {
        {
            let mut session = self.session();
            if session.pagination.prev_page() {
                self.forget_trip_page(&mut session);
            }
        }
        self.activate(View::Data).await
    }

    /// Replace the trip filter and go back to the first page.
    pub async fn apply_filter(&self, filter: TripFilter) -> Activation {
        if filter.is_empty() {
            tracing::info!("clearing trip filter");
        } else {
            tracing::info!("filtering trips: {filter:?}");
        }
        {
            let mut session = self.session();
            session.filter = filter;
            session.pagination.set_page(1);
            self.forget_trip_page(&mut session);
        }
        self.activate(View::Data).await
    }

    /// CSV of the trips currently on screen. Nothing is fetched.
    pub fn export(&self) -> Result<ExportPayload, ExportError> {
        let trips = self.session().trips.clone();
        let trips = trips.ok_or(ExportError::NothingToExport)?;
        let content = export::serialize(&trips)?;
        tracing::info!("exporting {} trips", trips.len());
        Ok(ExportPayload::new(content))
    }

    /// Detail rows for the trip at `index` on the current page.
    pub fn trip_detail(&self, index: usize) -> Option<Vec<RowSpec>> {
        let trips = self.session().trips.clone()?;
        trips.get(index).map(trip_detail_rows)
    }

    fn forget_trip_page(&self, session: &mut Session) {
        if let Some(key) = session.trips_key.take() {
            self.cache.invalidate(&key);
        }
    }

    fn begin(&self, view: View) -> Ticket {
        let mut session = self.session();
        if session.active != view {
            tracing::info!("switching view {} -> {}", session.active.id(), view.id());
        }
        session.active = view;
        session.generation += 1;

        let trips = session.trip_query();
        if view == View::Data {
            session.trips_key = Some(Resource::Trips(trips.clone()).cache_key());
        }
        Ticket {
            view,
            generation: session.generation,
            trips,
            page: session.pagination.page(),
        }
    }

    fn commit(
        &self,
        ticket: Ticket,
        frame: ViewFrame,
        trips: Option<Vec<TripRecord>>,
    ) -> Activation {
        let mut session = self.session();
        if session.generation != ticket.generation {
            tracing::debug!(
                "discarding stale {} result (generation {} < {})",
                ticket.view.id(),
                ticket.generation,
                session.generation
            );
            return Activation::Superseded { view: ticket.view };
        }

        if ticket.view == View::Data {
            session.trips = trips.map(Arc::new);
        }
        let frame = Arc::new(frame);
        session.frame = Some(frame.clone());
        Activation::Rendered(frame)
    }

    async fn load(&self, resource: Resource) -> FetchResult {
        let key = resource.cache_key();
        let source = self.source.clone();
        self.cache
            .get_or_fetch(&key, move || async move { source.fetch(&resource).await })
            .await
    }

    async fn assemble_overview(&self) -> ViewFrame {
        let (summary, hourly, boroughs) = tokio::join!(
            self.load(Resource::Summary),
            self.load(Resource::HourlyPatterns),
            self.load(Resource::BoroughRevenue),
        );

        let summary = match summary.as_ref() {
            Ok(dataset) => dataset.decode::<SummaryStats>().map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        View::Overview.frame(vec![
            widget("summary-stats", "Summary", summary, summary_table),
            widget(
                "hourly-chart",
                "Trips by Hour",
                rows::<HourlyBucket>(&hourly),
                hourly_trips_chart,
            ),
            widget(
                "borough-chart",
                "Revenue by Borough",
                rows::<BoroughTotals>(&boroughs),
                borough_revenue_chart,
            ),
        ])
    }

    async fn assemble_trends(&self) -> ViewFrame {
        let (daily, categories) = tokio::join!(
            self.load(Resource::DailyRevenue),
            self.load(Resource::TimeCategories),
        );
        let categories = rows::<TimeCategoryStat>(&categories);

        View::Trends.frame(vec![
            widget(
                "daily-chart",
                "Daily Revenue",
                rows::<DailyRevenue>(&daily),
                daily_revenue_chart,
            ),
            widget("time-chart", "Average Fare by Time of Day", categories.clone(), |c| {
                time_category_chart(&c, ColorToken::Secondary, |s| s.avg_fare)
            }),
            widget("speed-chart", "Average Speed by Time of Day", categories, |c| {
                time_category_chart(&c, ColorToken::Success, |s| s.avg_speed)
            }),
        ])
    }

    async fn assemble_insights(&self) -> ViewFrame {
        let (hourly, boroughs, categories) = tokio::join!(
            self.load(Resource::HourlyPatterns),
            self.load(Resource::BoroughRevenue),
            self.load(Resource::TimeCategories),
        );

        let mut widgets = Vec::with_capacity(6);
        widgets.extend(insight_widgets(
            Topic::PeakFarePremium,
            rows::<HourlyBucket>(&hourly).map(|r| insights::peak_fare_premium(&r)),
        ));
        widgets.extend(insight_widgets(
            Topic::DominantBorough,
            rows::<BoroughTotals>(&boroughs).map(|r| insights::dominant_borough_share(&r)),
        ));
        widgets.extend(insight_widgets(
            Topic::SpeedVariance,
            rows::<TimeCategoryStat>(&categories).map(|r| insights::speed_variance(&r)),
        ));
        View::Insights.frame(widgets)
    }

    async fn assemble_data(&self, ticket: &Ticket) -> (ViewFrame, Option<Vec<TripRecord>>) {
        let (trips, routes) = tokio::join!(
            self.load(Resource::Trips(ticket.trips.clone())),
            self.load(Resource::TopRoutes),
        );

        let trips = match trips.as_ref() {
            Ok(dataset) => normalize_page(dataset)
                .map(|(records, _)| records)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let snapshot = trips.as_ref().ok().cloned();

        let frame = View::Data.frame(vec![
            widget("data-table", "Trips", trips, |records| WidgetBody::Table {
                header: RowSpec::new(EXPORT_HEADER),
                rows: records.iter().map(trip_row).collect(),
            }),
            Widget::new(
                "page-info",
                "Page",
                WidgetBody::Text {
                    text: format!("Page {}", ticket.page),
                },
            ),
            widget(
                "routes-list",
                "Top Routes",
                rows::<RouteCount>(&routes),
                routes_table,
            ),
        ]);
        (frame, snapshot)
    }
}

fn rows<T: DeserializeOwned>(fetched: &FetchResult) -> Result<Vec<T>, String> {
    let dataset = fetched.as_ref().map_err(|e| e.to_string())?;
    dataset.decode_rows().map_err(|e| e.to_string())
}

/// Build a widget from its data, or an unavailable widget from the reason
/// the data is missing.
fn widget<T>(
    id: &'static str,
    title: &str,
    data: Result<T, String>,
    build: impl FnOnce(T) -> WidgetBody,
) -> Widget {
    let body = match data {
        Ok(data) => build(data),
        Err(reason) => {
            tracing::warn!("{id} unavailable: {reason}");
            WidgetBody::Unavailable { reason }
        }
    };
    Widget::new(id, title, body)
}

fn insight_widgets(topic: Topic, insight: Result<Insight, String>) -> [Widget; 2] {
    let (text_id, chart_id) = match topic {
        Topic::PeakFarePremium => ("peak-fare-insight", "peak-fare-chart"),
        Topic::DominantBorough => ("borough-share-insight", "borough-share-chart"),
        Topic::SpeedVariance => ("speed-variance-insight", "speed-variance-chart"),
    };
    let title = topic.title();

    match insight {
        Ok(insight) => {
            let headline = insight.headline_text().unwrap_or_else(|| MISSING.to_string());
            let text = match insight.status {
                InsightStatus::Ready { sentence, .. } => {
                    WidgetBody::Narrative { headline, sentence }
                }
                InsightStatus::Unavailable { reason } => WidgetBody::Unavailable { reason },
            };
            [
                Widget::new(text_id, title, text),
                Widget::new(chart_id, title, WidgetBody::Chart(insight.series)),
            ]
        }
        Err(reason) => {
            tracing::warn!("{text_id} unavailable: {reason}");
            [
                Widget::new(text_id, title, WidgetBody::Unavailable { reason: reason.clone() }),
                Widget::new(chart_id, title, WidgetBody::Unavailable { reason }),
            ]
        }
    }
}

fn summary_table(summary: SummaryStats) -> WidgetBody {
    WidgetBody::Table {
        header: RowSpec::new(["Metric", "Value"]),
        rows: vec![
            RowSpec::new(["Total Trips".to_string(), format_count(summary.total_trips)]),
            RowSpec::new([
                "Total Revenue".to_string(),
                format_currency(summary.total_revenue),
            ]),
            RowSpec::new(["Average Fare".to_string(), format_currency(summary.avg_fare)]),
            RowSpec::new([
                "Average Speed".to_string(),
                format_with_unit(summary.avg_speed, "mph"),
            ]),
        ],
    }
}

fn hourly_trips_chart(hourly: Vec<HourlyBucket>) -> WidgetBody {
    let chart = hourly.iter().fold(
        ChartSpec::new(ChartKind::Bar, Some(ColorToken::Primary)),
        |chart, b| {
            let label = b
                .hour
                .map(|h| format!("{h}:00"))
                .unwrap_or_else(|| MISSING.to_string());
            chart.point(label, b.trip_count.map(|c| c as f64))
        },
    );
    WidgetBody::Chart(chart)
}

fn borough_revenue_chart(boroughs: Vec<BoroughTotals>) -> WidgetBody {
    let chart = boroughs.iter().fold(
        ChartSpec::new(ChartKind::Donut, Some(ColorToken::Palette)),
        |chart, b| chart.point(b.borough.as_deref().unwrap_or("Unknown"), b.total_revenue),
    );
    WidgetBody::Chart(chart)
}

fn daily_revenue_chart(daily: Vec<DailyRevenue>) -> WidgetBody {
    let chart = daily.iter().fold(
        ChartSpec::new(ChartKind::Line, Some(ColorToken::Primary)),
        |chart, d| chart.point(d.date.as_deref().unwrap_or(MISSING), d.total_revenue),
    );
    WidgetBody::Chart(chart)
}

fn time_category_chart(
    categories: &[TimeCategoryStat],
    color: ColorToken,
    metric: impl Fn(&TimeCategoryStat) -> Option<f64>,
) -> WidgetBody {
    let chart = categories.iter().fold(
        ChartSpec::new(ChartKind::Bar, Some(color)),
        |chart, c| {
            chart.point(
                insights::time_category_label(c.time_category.as_deref()),
                metric(c),
            )
        },
    );
    WidgetBody::Chart(chart)
}

fn routes_table(routes: Vec<RouteCount>) -> WidgetBody {
    WidgetBody::Table {
        header: RowSpec::new(["Route", "Trips"]),
        rows: insights::rank_routes(&routes, TOP_ROUTES)
            .into_iter()
            .map(|r| {
                RowSpec::new([
                    r.route.unwrap_or_else(|| MISSING.to_string()),
                    format!("{} trips", format_count(r.trip_count)),
                ])
            })
            .collect(),
    }
}

fn text_or_missing(value: Option<&str>) -> String {
    value.unwrap_or(MISSING).to_string()
}

fn trip_row(trip: &TripRecord) -> RowSpec {
    RowSpec::new([
        text_or_missing(trip.trip_id.as_deref()),
        format_timestamp(trip.pickup_datetime.as_deref()),
        text_or_missing(trip.pickup_borough.as_deref()),
        text_or_missing(trip.dropoff_borough.as_deref()),
        format_with_unit(trip.distance, "mi"),
        format_currency(trip.fare),
        format_with_unit(trip.speed, "mph"),
    ])
}

fn trip_detail_rows(trip: &TripRecord) -> Vec<RowSpec> {
    let place = |borough: &Option<String>, zone: &Option<String>| {
        format!(
            "{} - {}",
            text_or_missing(borough.as_deref()),
            text_or_missing(zone.as_deref())
        )
    };
    vec![
        RowSpec::new(["ID".to_string(), text_or_missing(trip.trip_id.as_deref())]),
        RowSpec::new([
            "Pickup".to_string(),
            place(&trip.pickup_borough, &trip.pickup_zone),
        ]),
        RowSpec::new([
            "Dropoff".to_string(),
            place(&trip.dropoff_borough, &trip.dropoff_zone),
        ]),
        RowSpec::new([
            "Distance".to_string(),
            format_with_unit(trip.distance, "miles"),
        ]),
        RowSpec::new(["Fare".to_string(), format_currency(trip.fare)]),
        RowSpec::new(["Tip".to_string(), format_currency(trip.tip)]),
        RowSpec::new(["Total".to_string(), format_currency(trip.total)]),
        RowSpec::new(["Speed".to_string(), format_with_unit(trip.speed, "mph")]),
    ]
}
