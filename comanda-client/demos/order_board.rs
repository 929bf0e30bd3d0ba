//! Order Board Demo - TUI order grid over the sync controller
//!
//! Run: cargo run --example order_board
//!
//! An in-memory order service plays the kitchen: orders walk in, advance
//! through the lifecycle and get archived, all announced over the feed.
//! The board virtualizes the grid, so it stays smooth no matter how many
//! cards pile up. Logs go to comanda-demo.log.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use ratatui::{prelude::*, widgets::*};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use comanda_client::{
    ClientConfig, FeedClient, GridSpec, MemoryOrderApi, OrderApi, OrderSync, ScrollThrottle,
    SyncPhase,
};
use shared::message::FeedMessage;
use shared::models::{
    DeliveryPerson, ItemAddition, Order, OrderItem, OrderStatus, OrderType, PaymentMethod,
    PaymentStatus,
};
use shared::{money, util};

/// Card height in terminal rows
const ITEM_HEIGHT: u64 = 5;
/// Header, badges, board borders and help footer around the grid
const BOARD_CHROME: u16 = 9;

struct App {
    sync: OrderSync,
    feed: FeedClient,
    scroll_top: u64,
    throttle: ScrollThrottle,
    filter: Option<OrderStatus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_file = std::fs::File::create("comanda-demo.log")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    // In-memory order service, seeded mid-shift
    let mut rng = StdRng::from_entropy();
    let api = Arc::new(MemoryOrderApi::with_orders(seed_orders(&mut rng, 40)));
    let (service_tx, _) = broadcast::channel(64);
    let (client_tx, _) = broadcast::channel(16);

    let config = ClientConfig::default().with_auto_refresh_interval(Duration::from_secs(15));
    let sync = OrderSync::new(api.clone(), &config);
    sync.load(None).await?;
    sync.start_auto_refresh();

    let feed = FeedClient::memory(&service_tx, &client_tx);
    let forward = feed.forward_orders(sync.clone());

    spawn_kitchen(api, service_tx);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App {
        sync: sync.clone(),
        feed: feed.clone(),
        scroll_top: 0,
        throttle: ScrollThrottle::new(),
        filter: None,
    };
    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    feed.shutdown().await;
    forward.abort();
    sync.shutdown();

    if let Err(err) = res {
        println!("{err:?}");
    }
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                    let size = terminal.size()?;
                    let spec = board_spec(size.width);
                    let viewport = size.height.saturating_sub(BOARD_CHROME) as u64;
                    let count = app.sync.orders().len();
                    let page = (viewport / spec.item_height).max(1) * spec.item_height;

                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Up => app.scroll(spec, viewport, count, -(spec.item_height as i64)),
                        KeyCode::Down => app.scroll(spec, viewport, count, spec.item_height as i64),
                        KeyCode::PageUp => app.scroll(spec, viewport, count, -(page as i64)),
                        KeyCode::PageDown => app.scroll(spec, viewport, count, page as i64),
                        KeyCode::Home => app.scroll_top = 0,
                        KeyCode::End => app.scroll_top = max_scroll(spec, viewport, count),
                        KeyCode::Char('r') => {
                            let _ = app.sync.refresh().await;
                        }
                        KeyCode::Char('f') => {
                            app.filter = next_filter(app.filter);
                            app.scroll_top = 0;
                            let _ = app.sync.load(app.filter).await;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

impl App {
    fn scroll(&mut self, spec: GridSpec, viewport: u64, count: usize, delta: i64) {
        if !self.throttle.allow(Instant::now()) {
            return;
        }
        let max = max_scroll(spec, viewport, count);
        self.scroll_top = self.scroll_top.saturating_add_signed(delta).min(max);
    }
}

fn board_spec(width: u16) -> GridSpec {
    let columns = (width.saturating_sub(2) / 30).clamp(1, 4) as usize;
    GridSpec::new(ITEM_HEIGHT, columns)
}

/// Largest scroll offset that still starts on a full row.
fn max_scroll(spec: GridSpec, viewport: u64, count: usize) -> u64 {
    let max = spec.total_height(count).saturating_sub(viewport);
    max.div_ceil(spec.item_height) * spec.item_height
}

fn next_filter(current: Option<OrderStatus>) -> Option<OrderStatus> {
    match current {
        None => Some(OrderStatus::ALL[0]),
        Some(s) => {
            let pos = OrderStatus::ALL.iter().position(|x| *x == s).unwrap_or(0);
            OrderStatus::ALL.get(pos + 1).copied()
        }
    }
}

// ========== Rendering ==========

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Status badges
            Constraint::Min(1),    // Board
            Constraint::Length(1), // Help
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_badges(f, app, chunks[1]);
    draw_board(f, app, chunks[2]);

    let help = Paragraph::new(" Up/Down scroll | PgUp/PgDn page | Home/End jump | f filter | r refresh | q quit")
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, chunks[3]);
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let snapshot = app.sync.snapshot();
    let phase = match snapshot.phase {
        SyncPhase::Loading => Span::styled(
            " LOADING ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        SyncPhase::Refreshing => Span::styled(" REFRESHING ", Style::default().fg(Color::Cyan)),
        SyncPhase::Idle => Span::styled(
            " LIVE ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
    };
    let feed = if app.feed.is_connected() {
        Span::styled(" feed up ", Style::default().fg(Color::Green))
    } else {
        Span::styled(" feed down ", Style::default().fg(Color::Red))
    };
    let filter = match app.filter {
        Some(s) => format!(" filter: {} ", status_style(s).0),
        None => " filter: all ".to_string(),
    };

    let mut line = vec![
        Span::raw(" Comanda Order Board "),
        Span::raw("|"),
        phase,
        Span::raw("|"),
        feed,
        Span::raw("|"),
        Span::raw(filter),
    ];
    if let Some(err) = &snapshot.last_error {
        line.push(Span::styled(
            format!(" {err} "),
            Style::default().fg(Color::Red),
        ));
    }

    let header = Paragraph::new(Line::from(line)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn draw_badges(f: &mut Frame, app: &App, area: Rect) {
    let counts = app.sync.status_counts();
    let mut spans = Vec::new();
    for status in OrderStatus::ALL {
        let (label, color) = status_style(status);
        let style = if app.filter == Some(status) {
            Style::default()
                .fg(Color::Black)
                .bg(color)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(color)
        };
        spans.push(Span::styled(
            format!(" {label} {} ", counts.by_status(status)),
            style,
        ));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        format!(" active {} of {} ", counts.active(), counts.total()),
        Style::default().fg(Color::White),
    ));

    let badges =
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title(" Board "));
    f.render_widget(badges, area);
}

fn draw_board(f: &mut Frame, app: &App, area: Rect) {
    let orders = app.sync.orders();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Orders ({}) ", orders.len()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if orders.is_empty() {
        let empty = Paragraph::new("No orders match this view")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        f.render_widget(empty, inner);
        return;
    }

    let spec = board_spec(area.width);
    let window = spec.window(orders.len(), app.scroll_top, inner.height as u64);
    let col_width = inner.width / spec.columns as u16;

    for index in window.indices() {
        if let Some(rect) = cell_rect(spec, inner, index, app.scroll_top, col_width) {
            f.render_widget(order_card(&orders[index]), rect);
        }
    }
    // Keep the final partial row grid-shaped
    for slot in orders.len()..orders.len() + window.trailing_placeholders {
        if let Some(rect) = cell_rect(spec, inner, slot, app.scroll_top, col_width) {
            let placeholder = Block::default().borders(Borders::ALL).border_style(
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::DIM),
            );
            f.render_widget(placeholder, rect);
        }
    }

    let mut scrollbar_state = ScrollbarState::new(window.total_height as usize)
        .position(app.scroll_top as usize)
        .viewport_content_length(inner.height as usize);
    f.render_stateful_widget(
        Scrollbar::new(ScrollbarOrientation::VerticalRight),
        area.inner(Margin {
            horizontal: 0,
            vertical: 1,
        }),
        &mut scrollbar_state,
    );
}

/// Terminal rect for a grid slot, or None while it is outside the board.
fn cell_rect(
    spec: GridSpec,
    inner: Rect,
    slot: usize,
    scroll_top: u64,
    col_width: u16,
) -> Option<Rect> {
    let row = (slot / spec.columns) as u64;
    let col = (slot % spec.columns) as u16;
    let y = inner.y as i64 + (row * spec.item_height) as i64 - scroll_top as i64;
    if y < inner.y as i64 || y >= inner.bottom() as i64 {
        return None;
    }
    let height = (spec.item_height as i64).min(inner.bottom() as i64 - y) as u16;
    Some(Rect::new(inner.x + col * col_width, y as u16, col_width, height))
}

fn order_card(order: &Order) -> Paragraph<'_> {
    let (label, color) = status_style(order.status);
    let lines = vec![
        Line::from(Span::styled(
            order.customer_name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled(
                label,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("  R$ {:.2}", order.total_amount)),
        ]),
        Line::from(Span::styled(
            placed_at(order),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(format!(
                " #{} {} ",
                order.id % 100_000,
                type_label(order.order_type)
            )),
    )
}

fn placed_at(order: &Order) -> String {
    chrono::DateTime::from_timestamp_millis(order.created_at)
        .map(|dt| format!("placed {}", dt.format("%H:%M")))
        .unwrap_or_default()
}

fn status_style(status: OrderStatus) -> (&'static str, Color) {
    match status {
        OrderStatus::Pending => ("Pending", Color::Yellow),
        OrderStatus::Preparing => ("Preparing", Color::Cyan),
        OrderStatus::Ready => ("Ready", Color::Green),
        OrderStatus::Delivering => ("Delivering", Color::Blue),
        OrderStatus::Delivered => ("Delivered", Color::DarkGray),
        OrderStatus::Cancelled => ("Cancelled", Color::Red),
    }
}

fn type_label(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Delivery => "DELIVERY",
        OrderType::Pickup => "PICKUP",
        OrderType::DineIn => "DINE-IN",
    }
}

// ========== Kitchen Simulator ==========

/// Every couple of seconds: a new order walks in, an active order moves
/// forward, or a finished one gets archived. Changes go through the
/// order service and out over the feed, like the real deployment.
fn spawn_kitchen(api: Arc<MemoryOrderApi>, service_tx: broadcast::Sender<FeedMessage>) {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut seq = 0usize;
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let orders = api.orders();
            let roll: u8 = rng.gen_range(0..10);

            if roll < 3 || orders.is_empty() {
                let order = random_order(&mut rng, &mut seq);
                api.insert(order.clone());
                let _ = service_tx.send(FeedMessage::order_created(&order));
                tracing::info!(order_id = order.id, "Kitchen: new order");
            } else if roll < 8 {
                let active: Vec<&Order> = orders.iter().filter(|o| o.is_active()).collect();
                if let Some(order) = pick(&mut rng, &active) {
                    if let Some(next) = order.status.next_status() {
                        match api.update_status(order.id, next).await {
                            Ok(updated) => {
                                let _ = service_tx.send(FeedMessage::order_updated(&updated));
                            }
                            Err(err) => tracing::warn!(error = %err, "Kitchen: advance failed"),
                        }
                    }
                }
            } else {
                let done: Vec<&Order> = orders.iter().filter(|o| !o.is_active()).collect();
                if let Some(order) = pick(&mut rng, &done) {
                    api.remove(order.id);
                    let _ = service_tx.send(FeedMessage::order_removed(order.id));
                    tracing::info!(order_id = order.id, "Kitchen: order archived");
                }
            }
        }
    });
}

fn pick<'a>(rng: &mut StdRng, orders: &[&'a Order]) -> Option<&'a Order> {
    if orders.is_empty() {
        None
    } else {
        Some(orders[rng.gen_range(0..orders.len())])
    }
}

// ========== Seed Data ==========

const CUSTOMERS: &[&str] = &[
    "Ana Souza",
    "Bruno Lima",
    "Carla Mendes",
    "Diego Ferreira",
    "Elisa Ramos",
    "Felipe Castro",
    "Gabriela Nunes",
    "Henrique Alves",
    "Isabela Rocha",
    "João Pereira",
];

const PRODUCTS: &[(&str, f64)] = &[
    ("Margherita Pizza", 42.0),
    ("X-Salada Burger", 28.5),
    ("Feijoada Completa", 54.9),
    ("Açaí Bowl", 19.9),
    ("Pastel de Queijo", 9.5),
    ("Guaraná 2L", 12.0),
];

const STREETS: &[&str] = &[
    "Rua das Flores",
    "Av. Paulista",
    "Rua Augusta",
    "Travessa do Comércio",
];

fn random_order(rng: &mut StdRng, seq: &mut usize) -> Order {
    let order_type = match rng.gen_range(0..3) {
        0 => OrderType::Delivery,
        1 => OrderType::Pickup,
        _ => OrderType::DineIn,
    };

    let items: Vec<OrderItem> = (0..rng.gen_range(1..=3))
        .map(|i| {
            let (name, price) = PRODUCTS[rng.gen_range(0..PRODUCTS.len())];
            let additions = if rng.gen_bool(0.3) {
                vec![ItemAddition {
                    id: 1,
                    name: "Extra cheese".to_string(),
                    unit_price: 3.5,
                    quantity: 1,
                }]
            } else {
                vec![]
            };
            OrderItem {
                product_id: i as i64 + 1,
                name: name.to_string(),
                unit_price: price,
                quantity: rng.gen_range(1..=2),
                note: None,
                additions,
            }
        })
        .collect();

    let delivery_fee = if order_type == OrderType::Delivery {
        8.0
    } else {
        0.0
    };
    let now = util::now_millis();
    let customer = CUSTOMERS[*seq % CUSTOMERS.len()];
    *seq += 1;

    Order {
        id: util::snowflake_id(),
        order_type,
        status: OrderStatus::Pending,
        customer_name: customer.to_string(),
        customer_phone: Some(format!(
            "+55 11 9{:04}-{:04}",
            rng.gen_range(1000..10000),
            rng.gen_range(0..10000)
        )),
        address: (order_type == OrderType::Delivery).then(|| {
            format!(
                "{}, {}",
                STREETS[rng.gen_range(0..STREETS.len())],
                rng.gen_range(1..999)
            )
        }),
        note: None,
        total_amount: money::to_f64(money::order_total(&items, delivery_fee)),
        items,
        delivery_fee,
        payment_method: match rng.gen_range(0..4) {
            0 => PaymentMethod::Cash,
            1 => PaymentMethod::Credit,
            2 => PaymentMethod::Debit,
            _ => PaymentMethod::Pix,
        },
        payment_status: PaymentStatus::Pending,
        amount_paid: None,
        delivery_person: None,
        created_at: now,
        updated_at: now,
    }
}

/// A board mid-shift: staggered ages, every lifecycle stage present.
fn seed_orders(rng: &mut StdRng, n: usize) -> Vec<Order> {
    let mut seq = 0usize;
    (0..n)
        .map(|i| {
            let mut order = random_order(rng, &mut seq);
            order.status = OrderStatus::ALL[rng.gen_range(0..OrderStatus::ALL.len())];
            order.created_at -= (i as i64) * 180_000;
            order.updated_at = order.created_at;
            if order.status == OrderStatus::Delivering {
                order.delivery_person = Some(DeliveryPerson {
                    id: 1,
                    name: "Marcos Couri".to_string(),
                    phone: None,
                });
            }
            order
        })
        .collect()
}
