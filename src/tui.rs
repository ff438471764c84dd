use crate::broker::Broker;
use crate::holdings::{
    compute_broker_distribution, compute_holdings, compute_summary, BrokerSlice, Holding,
    PortfolioSummary,
};
use crate::quotes::QuoteClient;
use crate::store::PortfolioStore;
use crate::transaction::{Currency, Transaction, TransactionType};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tui_big_text::{BigText, PixelSize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Overview,
    Holdings,
    Brokers,
}

impl Tab {
    fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Holdings => "Holdings",
            Tab::Brokers => "Brokers",
        }
    }

    fn all() -> &'static [Tab] {
        &[Tab::Overview, Tab::Holdings, Tab::Brokers]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Normal,
    Form,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetworkStatus {
    Connected,
    Partial,
    Disconnected,
}

/// Everything the dashboard shows, recomputed in the background whenever
/// the store changes or the refresh interval fires.
#[derive(Clone)]
pub struct Snapshot {
    pub holdings: Vec<Holding>,
    pub summary: PortfolioSummary,
    pub distribution: Vec<BrokerSlice>,
    pub brokers: Vec<Broker>,
    pub network_status: NetworkStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FormField {
    Ticker,
    Broker,
    Quantity,
    Price,
    Kind,
}

impl FormField {
    fn all() -> &'static [FormField] {
        &[
            FormField::Ticker,
            FormField::Broker,
            FormField::Quantity,
            FormField::Price,
            FormField::Kind,
        ]
    }

    fn label(self) -> &'static str {
        match self {
            FormField::Ticker => "Ticker",
            FormField::Broker => "Broker",
            FormField::Quantity => "Quantity",
            FormField::Price => "Price",
            FormField::Kind => "Type",
        }
    }
}

/// Input state of the add-transaction dialog.
struct TradeForm {
    ticker: String,
    broker: String,
    quantity: String,
    price: String,
    kind: TransactionType,
    focus: FormField,
}

impl TradeForm {
    fn new() -> TradeForm {
        TradeForm {
            ticker: String::new(),
            broker: String::new(),
            quantity: String::new(),
            price: String::new(),
            kind: TransactionType::Buy,
            focus: FormField::Ticker,
        }
    }

    fn value(&self, field: FormField) -> String {
        match field {
            FormField::Ticker => self.ticker.clone(),
            FormField::Broker => self.broker.clone(),
            FormField::Quantity => self.quantity.clone(),
            FormField::Price => self.price.clone(),
            FormField::Kind => self.kind.to_string(),
        }
    }

    fn next_field(&mut self) {
        let fields = FormField::all();
        let index = fields.iter().position(|&f| f == self.focus).unwrap_or(0);
        self.focus = fields[(index + 1) % fields.len()];
    }

    fn previous_field(&mut self) {
        let fields = FormField::all();
        let index = fields.iter().position(|&f| f == self.focus).unwrap_or(0);
        self.focus = fields[(index + fields.len() - 1) % fields.len()];
    }

    fn toggle_kind(&mut self) {
        self.kind = match self.kind {
            TransactionType::Buy => TransactionType::Sell,
            TransactionType::Sell => TransactionType::Buy,
        };
    }

    fn push_char(&mut self, c: char) {
        match self.focus {
            FormField::Ticker => {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    self.ticker.push(c.to_ascii_uppercase());
                }
            }
            FormField::Broker => self.broker.push(c),
            FormField::Quantity => {
                if c.is_ascii_digit() || (c == '.' && !self.quantity.contains('.')) {
                    self.quantity.push(c);
                }
            }
            FormField::Price => {
                if c.is_ascii_digit() || (c == '.' && !self.price.contains('.')) {
                    self.price.push(c);
                }
            }
            FormField::Kind => {
                if c == ' ' {
                    self.toggle_kind();
                }
            }
        }
    }

    fn pop_char(&mut self) {
        match self.focus {
            FormField::Ticker => {
                self.ticker.pop();
            }
            FormField::Broker => {
                self.broker.pop();
            }
            FormField::Quantity => {
                self.quantity.pop();
            }
            FormField::Price => {
                self.price.pop();
            }
            FormField::Kind => {}
        }
    }

    /// Validates the input and appends the transaction to the store.
    fn submit(&self, store: &PortfolioStore) -> Result<Transaction, String> {
        let quantity: f64 = self
            .quantity
            .parse()
            .map_err(|_| format!("Invalid quantity format: {}", self.quantity))?;
        let price: f64 = self
            .price
            .parse()
            .map_err(|_| format!("Invalid price format: {}", self.price))?;

        let broker = crate::broker::BrokerRegistry::new(store)
            .resolve_active(&self.broker)
            .map_err(|e| e.to_string())?;

        let transaction = Transaction::new(
            &self.ticker,
            &broker.name,
            quantity,
            price,
            chrono::Utc::now(),
            self.kind,
            Currency::Usd,
        )
        .map_err(|e| e.to_string())?;

        store
            .append_transaction(transaction.clone())
            .map_err(|e| e.to_string())?;
        Ok(transaction)
    }
}

pub struct App {
    pub current_tab: Tab,
    pub snapshot: Option<Snapshot>,
    pub should_quit: bool,
    pub error_message: Option<String>,
    pub currency: String,
    pub last_update: Instant,
    pub flash_state: bool,
    pub mode: AppMode,
    pub selected_holding: usize,
    form: TradeForm,
    snapshot_receiver: Option<mpsc::UnboundedReceiver<Snapshot>>,
    store: Arc<PortfolioStore>,
}

impl App {
    fn new(store: Arc<PortfolioStore>, currency: String) -> App {
        App {
            current_tab: Tab::Overview,
            snapshot: None,
            should_quit: false,
            error_message: None,
            currency,
            last_update: Instant::now(),
            flash_state: false,
            mode: AppMode::Normal,
            selected_holding: 0,
            form: TradeForm::new(),
            snapshot_receiver: None,
            store,
        }
    }

    fn try_receive_snapshot(&mut self) -> bool {
        if let Some(receiver) = &mut self.snapshot_receiver {
            if let Ok(snapshot) = receiver.try_recv() {
                self.selected_holding = self
                    .selected_holding
                    .min(snapshot.holdings.len().saturating_sub(1));
                self.snapshot = Some(snapshot);
                self.last_update = Instant::now();
                self.flash_state = !self.flash_state;
                return true;
            }
        }
        false
    }

    fn next_tab(&mut self) {
        let tabs = Tab::all();
        let index = tabs.iter().position(|&t| t == self.current_tab).unwrap_or(0);
        self.current_tab = tabs[(index + 1) % tabs.len()];
    }

    fn previous_tab(&mut self) {
        let tabs = Tab::all();
        let index = tabs.iter().position(|&t| t == self.current_tab).unwrap_or(0);
        self.current_tab = tabs[(index + tabs.len() - 1) % tabs.len()];
    }

    fn select_next(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            if self.selected_holding < snapshot.holdings.len().saturating_sub(1) {
                self.selected_holding += 1;
            }
        }
    }

    fn select_previous(&mut self) {
        if self.selected_holding > 0 {
            self.selected_holding -= 1;
        }
    }
}

/// Reads the store and live prices, recomputes every derived view.
async fn build_snapshot(store: &PortfolioStore, client: &QuoteClient) -> Snapshot {
    let transactions = store.transactions().unwrap_or_default();
    let brokers = store.brokers().unwrap_or_default();

    let mut tickers: Vec<String> = transactions.iter().map(|t| t.ticker.clone()).collect();
    tickers.sort();
    tickers.dedup();

    let (prices, errors) = client.price_map(&tickers).await;
    let network_status = if errors.is_empty() {
        NetworkStatus::Connected
    } else if prices.is_empty() {
        NetworkStatus::Disconnected
    } else {
        NetworkStatus::Partial
    };

    let holdings = compute_holdings(&transactions, &prices);
    let summary = compute_summary(&holdings);
    let distribution = compute_broker_distribution(&transactions, &prices);

    Snapshot {
        holdings,
        summary,
        distribution,
        brokers,
        network_status,
    }
}

pub async fn run_tui(
    store: Arc<PortfolioStore>,
    client: Arc<QuoteClient>,
    currency: String,
) -> eyre::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(store.clone(), currency);

    // recompute in the background: every 5 seconds, and on store changes
    let (snapshot_sender, snapshot_receiver) = mpsc::unbounded_channel();
    app.snapshot_receiver = Some(snapshot_receiver);

    let bg_store = store.clone();
    let bg_client = client.clone();
    tokio::spawn(async move {
        let mut store_events = bg_store.subscribe();
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = store_events.recv() => {}
            }
            let snapshot = build_snapshot(&bg_store, &bg_client).await;
            if snapshot_sender.send(snapshot).is_err() {
                break; // channel closed, exit task
            }
        }
    });

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()>
where
    io::Error: From<<B as Backend>::Error>,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        app.try_receive_snapshot();

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.mode {
                        AppMode::Normal => {
                            if app.error_message.take().is_some() {
                                continue; // any key dismisses the error popup
                            }
                            match key.code {
                                KeyCode::Char('q') | KeyCode::Esc => {
                                    app.should_quit = true;
                                }
                                KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => {
                                    app.previous_tab();
                                }
                                KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => {
                                    app.next_tab();
                                }
                                KeyCode::Char('j') | KeyCode::Down => {
                                    if app.current_tab == Tab::Holdings {
                                        app.select_next();
                                    }
                                }
                                KeyCode::Char('k') | KeyCode::Up => {
                                    if app.current_tab == Tab::Holdings {
                                        app.select_previous();
                                    }
                                }
                                KeyCode::Char('a') => {
                                    app.form = TradeForm::new();
                                    app.mode = AppMode::Form;
                                }
                                KeyCode::Char('1') => app.current_tab = Tab::Overview,
                                KeyCode::Char('2') => app.current_tab = Tab::Holdings,
                                KeyCode::Char('3') => app.current_tab = Tab::Brokers,
                                _ => {}
                            }
                        }
                        AppMode::Form => match key.code {
                            KeyCode::Esc => {
                                app.mode = AppMode::Normal;
                            }
                            KeyCode::Enter => match app.form.submit(&app.store) {
                                Ok(_) => {
                                    // snapshot refresh arrives via the store subscription
                                    app.mode = AppMode::Normal;
                                }
                                Err(e) => {
                                    app.error_message = Some(e);
                                    app.mode = AppMode::Normal;
                                }
                            },
                            KeyCode::Tab | KeyCode::Down => app.form.next_field(),
                            KeyCode::BackTab | KeyCode::Up => app.form.previous_field(),
                            KeyCode::Left | KeyCode::Right => {
                                if app.form.focus == FormField::Kind {
                                    app.form.toggle_kind();
                                }
                            }
                            KeyCode::Backspace => app.form.pop_char(),
                            KeyCode::Char(c) => app.form.push_char(c),
                            _ => {}
                        },
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn format_with_commas(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let parts: Vec<&str> = formatted.split('.').collect();
    let integer_part = parts[0];
    let decimal_part = parts.get(1).unwrap_or(&"00");

    let formatted_integer = integer_part
        .chars()
        .rev()
        .collect::<String>()
        .chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect::<String>();

    format!("{formatted_integer}.{decimal_part}")
}

fn format_currency(value: f64, currency: &str) -> String {
    match currency {
        "USD" => format!("${}", format_with_commas(value)),
        "KRW" => format!("₩{}", format_with_commas(value)),
        _ => format!("{} {currency}", format_with_commas(value)),
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(f.area());

    let tab_titles: Vec<Line> = Tab::all()
        .iter()
        .map(|t| {
            let style = if *t == app.current_tab {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(t.title(), style))
        })
        .collect();

    let tabs = ratatui::widgets::Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title("Stockfolio"))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow))
        .select(
            Tab::all()
                .iter()
                .position(|&t| t == app.current_tab)
                .unwrap_or(0),
        );
    f.render_widget(tabs, chunks[0]);

    match app.current_tab {
        Tab::Overview => render_overview(f, chunks[1], app),
        Tab::Holdings => render_holdings(f, chunks[1], app),
        Tab::Brokers => render_brokers(f, chunks[1], app),
    }

    if app.mode == AppMode::Form {
        render_trade_form(f, app);
    }

    if let Some(error) = &app.error_message {
        render_error_popup(f, error);
    }
}

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let Some(snapshot) = &app.snapshot else {
        render_loading(f, area);
        return;
    };

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    // total value in big text, with refresh and network indicators
    let big_text_value = format_currency(snapshot.summary.total_value, &app.currency);
    let big_text = BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .lines(vec![big_text_value.clone().into()])
        .build();

    let refresh_indicator = if app.flash_state { "↻" } else { "·" };
    let network_indicator = match snapshot.network_status {
        NetworkStatus::Connected => "live",
        NetworkStatus::Partial => "partial",
        NetworkStatus::Disconnected => "offline",
    };
    let big_text_block = Block::default()
        .borders(Borders::ALL)
        .title(format!(
            "Total Portfolio Value ({}) {} [{}]",
            app.currency, refresh_indicator, network_indicator
        ))
        .title_alignment(Alignment::Center);
    f.render_widget(big_text_block, main_chunks[0]);

    let inner = main_chunks[0].inner(ratatui::layout::Margin {
        horizontal: 1,
        vertical: 1,
    });
    let big_text_width = big_text_value.len() as u16 * 4;
    let centered_area = if big_text_width < inner.width {
        let margin = (inner.width - big_text_width) / 2;
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(margin),
                Constraint::Min(0),
                Constraint::Length(margin),
            ])
            .split(inner)[1]
    } else {
        inner
    };
    f.render_widget(big_text, centered_area);

    // broker distribution: bar chart left, detailed list right
    let distribution_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[1]);

    let data: Vec<(&str, u64)> = snapshot
        .distribution
        .iter()
        .map(|slice| (slice.broker.as_str(), slice.weight as u64))
        .collect();
    let barchart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Broker Distribution"),
        )
        .data(&data)
        .bar_width(9)
        .bar_style(Style::default().fg(Color::Yellow))
        .value_style(Style::default().fg(Color::Black).bg(Color::Yellow));
    f.render_widget(barchart, distribution_chunks[0]);

    let detailed_list: Vec<ListItem> = snapshot
        .distribution
        .iter()
        .map(|slice| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<16}", slice.broker),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    format!("{:>12}", format_currency(slice.value, &app.currency)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:>8.2}%", slice.weight),
                    Style::default().fg(Color::Cyan),
                ),
            ]))
        })
        .collect();
    let list = List::new(detailed_list)
        .block(Block::default().borders(Borders::ALL).title("By Broker"))
        .style(Style::default().fg(Color::White));
    f.render_widget(list, distribution_chunks[1]);

    let help_text = Paragraph::new(
        "Navigation: h/l (tabs) | j/k (select in Holdings) | a (add transaction) | 1-3 (direct) | q (quit)",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"))
    .style(Style::default().fg(Color::Gray))
    .alignment(Alignment::Center);
    f.render_widget(help_text, main_chunks[2]);
}

fn render_holdings(f: &mut Frame, area: Rect, app: &App) {
    let Some(snapshot) = &app.snapshot else {
        render_loading(f, area);
        return;
    };

    let header_cells = ["Ticker", "Qty", "Avg Cost", "Value", "PnL", "PnL %", "Weight"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows = snapshot.holdings.iter().enumerate().map(|(i, holding)| {
        let row_style = if i == app.selected_holding {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };
        let pnl_color = if holding.gain_loss >= 0.0 {
            Color::Green
        } else {
            Color::Red
        };
        Row::new(vec![
            Cell::from(holding.ticker.clone()),
            Cell::from(format!("{:.4}", holding.quantity)),
            Cell::from(format!("{:.2}", holding.average_price)),
            Cell::from(format_currency(holding.current_value, &app.currency)),
            Cell::from(format!("{:+.2}", holding.gain_loss))
                .style(Style::default().fg(pnl_color)),
            Cell::from(format!("{:+.2}%", holding.gain_loss_percent))
                .style(Style::default().fg(pnl_color)),
            Cell::from(format!("{:.2}%", holding.weight)),
        ])
        .height(1)
        .style(row_style)
    });

    let total_color = if snapshot.summary.total_gain_loss >= 0.0 {
        Color::Green
    } else {
        Color::Red
    };
    let total_row = Row::new(vec![
        Cell::from("TOTAL").style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Cell::from(""),
        Cell::from(format_with_commas(snapshot.summary.total_investment)),
        Cell::from(format_currency(
            snapshot.summary.total_value,
            &app.currency,
        ))
        .style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(format!("{:+.2}", snapshot.summary.total_gain_loss))
            .style(Style::default().fg(total_color)),
        Cell::from(format!("{:+.2}%", snapshot.summary.gain_loss_percent))
            .style(Style::default().fg(total_color)),
        Cell::from(""),
    ])
    .height(1);

    let constraints = [
        Constraint::Percentage(16),
        Constraint::Percentage(12),
        Constraint::Percentage(14),
        Constraint::Percentage(18),
        Constraint::Percentage(14),
        Constraint::Percentage(12),
        Constraint::Percentage(14),
    ];

    let table = Table::new(rows.chain(std::iter::once(total_row)), constraints)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Holdings - j/k (select) | a (add transaction) | q (quit)"),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(table, area);
}

fn render_brokers(f: &mut Frame, area: Rect, app: &App) {
    let Some(snapshot) = &app.snapshot else {
        render_loading(f, area);
        return;
    };

    let items: Vec<ListItem> = snapshot
        .brokers
        .iter()
        .map(|broker| {
            let (status, color) = if broker.is_active {
                ("active", Color::Green)
            } else {
                ("inactive", Color::DarkGray)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<24}", broker.name), Style::default().fg(Color::White)),
                Span::styled(format!("{status:<10}"), Style::default().fg(color)),
                Span::styled(
                    broker.created_at.format("since %Y-%m-%d").to_string(),
                    Style::default().fg(Color::Gray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Brokers"))
        .style(Style::default().fg(Color::White));
    f.render_widget(list, area);
}

fn render_loading(f: &mut Frame, area: Rect) {
    let loading_text = Paragraph::new("Loading portfolio data...")
        .block(Block::default().borders(Borders::ALL).title("Loading"))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);
    f.render_widget(loading_text, area);
}

fn render_trade_form(f: &mut Frame, app: &App) {
    let popup_area = centered_rect(50, 60, f.area());
    f.render_widget(Clear, popup_area);

    let main_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Add Transaction ")
        .title_alignment(Alignment::Center)
        .style(Style::default().bg(Color::Black));
    f.render_widget(main_block, popup_area);

    let fields = FormField::all();
    let mut constraints: Vec<Constraint> = fields.iter().map(|_| Constraint::Length(3)).collect();
    constraints.push(Constraint::Length(3));
    let field_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .margin(1)
        .split(popup_area);

    for (i, field) in fields.iter().enumerate() {
        let focused = app.form.focus == *field;
        let border_color = if focused { Color::Yellow } else { Color::Gray };
        let mut value = app.form.value(*field);
        if focused && *field != FormField::Kind {
            let cursor = if app.flash_state { "█" } else { "▌" };
            value.push_str(cursor);
        }
        if *field == FormField::Kind {
            value.push_str("  (←/→ or space to toggle)");
        }

        let input = Paragraph::new(value)
            .style(Style::default().fg(Color::White))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(border_color))
                    .title(format!(" {} ", field.label())),
            );
        f.render_widget(input, field_chunks[i]);
    }

    let instructions = Paragraph::new("Enter: Save | Tab: Next Field | Esc: Cancel")
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::NONE));
    f.render_widget(instructions, field_chunks[fields.len()]);
}

fn render_error_popup(f: &mut Frame, error: &str) {
    let popup_area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, popup_area);

    let error_paragraph = Paragraph::new(error)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Error")
                .style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(error_paragraph, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerRegistry;

    fn app_with_store() -> App {
        let store = Arc::new(PortfolioStore::temporary().unwrap());
        App::new(store, "USD".to_string())
    }

    #[test]
    fn test_tab_navigation_wraps() {
        let mut app = app_with_store();
        assert_eq!(app.current_tab, Tab::Overview);
        app.next_tab();
        assert_eq!(app.current_tab, Tab::Holdings);
        app.next_tab();
        app.next_tab();
        assert_eq!(app.current_tab, Tab::Overview);
        app.previous_tab();
        assert_eq!(app.current_tab, Tab::Brokers);
    }

    #[test]
    fn test_form_field_input_filters() {
        let mut form = TradeForm::new();
        for c in "aapl!".chars() {
            form.push_char(c);
        }
        assert_eq!(form.ticker, "AAPL");

        form.focus = FormField::Quantity;
        for c in "1.2.3x".chars() {
            form.push_char(c);
        }
        assert_eq!(form.quantity, "1.23");

        form.focus = FormField::Kind;
        assert_eq!(form.kind, TransactionType::Buy);
        form.push_char(' ');
        assert_eq!(form.kind, TransactionType::Sell);
    }

    #[test]
    fn test_form_submit_appends_to_store() {
        let store = Arc::new(PortfolioStore::temporary().unwrap());
        BrokerRegistry::new(&store).add("Schwab").unwrap();

        let mut form = TradeForm::new();
        form.ticker = "AAPL".to_string();
        form.broker = "Schwab".to_string();
        form.quantity = "10".to_string();
        form.price = "178.5".to_string();

        form.submit(&store).unwrap();
        let transactions = store.transactions().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].ticker, "AAPL");
    }

    #[test]
    fn test_form_submit_rejects_unknown_broker() {
        let store = Arc::new(PortfolioStore::temporary().unwrap());
        let mut form = TradeForm::new();
        form.ticker = "AAPL".to_string();
        form.broker = "Nowhere".to_string();
        form.quantity = "10".to_string();
        form.price = "178.5".to_string();

        assert!(form.submit(&store).is_err());
        assert!(store.transactions().unwrap().is_empty());
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1234567.891, "USD"), "$1,234,567.89");
        assert_eq!(format_currency(999.5, "USD"), "$999.50");
    }
}
