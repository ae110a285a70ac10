use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;
use vehicle_valuation::{
    format_adjustment, AnalyticsSummary, ConditionGrade, PriceCalculator, Vehicle,
    VehicleAnalytics, VehicleManager, DEFAULT_MILEAGE,
};

const PAGE_STEP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Inventory,
    Analytics,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Inventory => Page::Analytics,
            Page::Analytics => Page::Inventory,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Inventory => "Inventory",
            Page::Analytics => "Analytics",
        }
    }
}

pub struct App {
    pub inventory: VehicleManager,
    pub filtered_vehicles: Vec<Vehicle>,
    pub state: TableState,
    pub analytics_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub make_filter: Option<String>,
    pub calculator: PriceCalculator,
    summary: AnalyticsSummary,
}

impl App {
    pub fn new(vehicles: Vec<Vehicle>, calculator: PriceCalculator) -> Self {
        let summary =
            VehicleAnalytics::with_reference_year(vehicles.clone(), calculator.reference_year())
                .summary();

        let mut state = TableState::default();
        if !vehicles.is_empty() {
            state.select(Some(0));
        }

        let mut analytics_state = TableState::default();
        if !summary.by_make.is_empty() {
            analytics_state.select(Some(0));
        }

        Self {
            filtered_vehicles: vehicles.clone(),
            inventory: VehicleManager::from_vehicles(vehicles),
            state,
            analytics_state,
            current_page: Page::Inventory,
            show_detail: false,
            make_filter: None,
            calculator,
            summary,
        }
    }

    pub fn summary(&self) -> &AnalyticsSummary {
        &self.summary
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn selected_vehicle(&self) -> Option<&Vehicle> {
        self.state.selected().and_then(|i| self.filtered_vehicles.get(i))
    }

    /// Make under the cursor on the analytics page
    pub fn selected_make(&self) -> Option<&String> {
        self.analytics_state
            .selected()
            .and_then(|i| self.summary.by_make.keys().nth(i))
    }

    pub fn apply_make_filter(&mut self, make: Option<String>) {
        self.filtered_vehicles = match &make {
            Some(make) => self.inventory.filter_by_make(make).into_iter().cloned().collect(),
            None => self.inventory.get_all_vehicles().to_vec(),
        };
        self.make_filter = make;

        // Reset selection to first item
        if self.filtered_vehicles.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn clear_filter(&mut self) {
        self.apply_make_filter(None);
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Inventory => (&mut self.state, self.filtered_vehicles.len()),
            Page::Analytics => (&mut self.analytics_state, self.summary.by_make.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map(|i| (i + PAGE_STEP).min(len - 1)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map(|i| i.saturating_sub(PAGE_STEP)).unwrap_or(0);
        state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Enter if app.current_page == Page::Analytics => {
                    let make = app.selected_make().cloned();
                    app.apply_make_filter(make);
                    app.current_page = Page::Inventory;
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::Char('c') => {
                    app.clear_filter();
                    app.current_page = Page::Inventory;
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Inventory if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);

            render_inventory(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Inventory => render_inventory(f, chunks[1], app),
        Page::Analytics => render_analytics(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn header_cells(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Inventory, Page::Analytics].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let summary = app.summary();
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Vehicles: {}", summary.total_vehicles),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Avg price: {:.2}", summary.average_price),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_inventory(f: &mut Frame, area: Rect, app: &mut App) {
    let calculator = app.calculator;

    let rows = app.filtered_vehicles.iter().map(|vehicle| {
        let suggestion = calculator.get_price_suggestion(
            &vehicle.make,
            vehicle.year,
            ConditionGrade::Good.as_str(),
        );
        // asking above the suggested band shows red, below shows green
        let color = if vehicle.price > suggestion.suggested_max {
            Color::Red
        } else if vehicle.price < suggestion.suggested_min {
            Color::Green
        } else {
            Color::White
        };

        Row::new(vec![
            Cell::from(vehicle.year.to_string()),
            Cell::from(truncate(&vehicle.make, 14)),
            Cell::from(truncate(&vehicle.model, 20)),
            Cell::from(format!("{:.2}", vehicle.price)).style(Style::default().fg(color)),
            Cell::from(format!("{:.2}", suggestion.suggested_price)),
        ])
        .height(1)
    });

    let title = match &app.make_filter {
        Some(make) => format!(" Vehicles - {} ", make),
        None => " Vehicles ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Length(22),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header_cells(&["Year", "Make", "Model", "Asking", "Suggested"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_analytics(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(area);

    let summary = app.summary().clone();
    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);

    let overview = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("  Total vehicles: ", label),
            Span::raw(summary.total_vehicles.to_string()),
        ]),
        Line::from(vec![
            Span::styled("  Average price:  ", label),
            Span::raw(format!("{:.2}", summary.average_price)),
        ]),
        Line::from(vec![
            Span::styled("  Price range:    ", label),
            Span::raw(format!(
                "{:.2} - {:.2}",
                summary.price_range.min, summary.price_range.max
            )),
        ]),
        Line::from(vec![
            Span::styled("  Average age:    ", label),
            Span::raw(format!("{:.1} years", summary.average_age)),
        ]),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Overview "),
    );
    f.render_widget(overview, chunks[0]);

    let rows = summary.by_make.iter().map(|(make, count)| {
        Row::new(vec![
            Cell::from(make.clone()),
            Cell::from(count.to_string()),
        ])
        .height(1)
    });

    let table = Table::new(rows, [Constraint::Length(24), Constraint::Length(10)])
        .header(header_cells(&["Make", "Vehicles"]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" By Make (Enter to filter) "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], &mut app.analytics_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.filtered_vehicles.len();

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(make) = &app.make_filter {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Make: {}", make),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" ("));
        status_spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" clear)"));
    }

    for (key, label) in [
        ("Enter", " Details | "),
        ("Tab", " Page | "),
        ("↑/↓", " Nav | "),
        ("PgUp/PgDn", " Fast | "),
    ] {
        if key == "Enter" {
            status_spans.push(Span::raw(" | "));
        }
        status_spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(label));
    }
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Vehicle Details ");

    let vehicle = match app.selected_vehicle() {
        Some(v) => v,
        None => {
            f.render_widget(Paragraph::new("No vehicle selected").block(block), area);
            return;
        }
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let section = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);

    let mut content = vec![
        Line::from(vec![Span::styled(format!("  {}", vehicle.label()), section)]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Asking: ", label),
            Span::raw(format!("{:.2}", vehicle.price)),
        ]),
        Line::from(vec![
            Span::styled("  Owner: ", label),
            Span::raw(vehicle.owner.clone().unwrap_or_else(|| "-".to_string())),
        ]),
        Line::from(vec![
            Span::styled("  Listed: ", label),
            Span::raw(vehicle.created_at.format("%Y-%m-%d").to_string()),
        ]),
        Line::from(""),
    ];

    let suggestion = app.calculator.get_price_suggestion(
        &vehicle.make,
        vehicle.year,
        ConditionGrade::Good.as_str(),
    );
    content.push(Line::from(vec![Span::styled("  PRICE SUGGESTION", section)]));
    content.push(Line::from(format!(
        "  {:.2}  ({:.2} - {:.2}), age {}",
        suggestion.suggested_price,
        suggestion.suggested_min,
        suggestion.suggested_max,
        suggestion.vehicle_age
    )));
    content.push(Line::from(""));

    content.push(Line::from(vec![Span::styled("  MARKET VALUE", section)]));
    match app.calculator.calculate_market_value(
        &vehicle.make,
        &vehicle.model,
        vehicle.year,
        vehicle.price,
        ConditionGrade::Good,
        DEFAULT_MILEAGE,
    ) {
        Ok(result) => {
            content.push(Line::from(format!(
                "  Estimated {:.2} (make {}, condition {}, mileage {})",
                result.estimated_value,
                format_adjustment(result.make_adjustment_pct),
                format_adjustment(result.condition_adjustment_pct),
                format_adjustment(result.mileage_adjustment_pct),
            )));
            content.push(Line::from(format!(
                "  Depreciated {:.2} ({:.1}% lost)",
                result.depreciated_value, result.depreciation_percent
            )));
        }
        Err(err) => content.push(Line::from(Span::styled(
            format!("  {}", err),
            Style::default().fg(Color::Red),
        ))),
    }
    content.push(Line::from(""));

    content.push(Line::from(vec![Span::styled("  DEPRECIATION SCHEDULE", section)]));
    let schedule = app
        .calculator
        .depreciation_model(vehicle.price, vehicle.year)
        .get_depreciation_schedule();
    for (year, value) in schedule {
        content.push(Line::from(format!("  year {:>2}: {:>12.2}", year, value)));
    }

    if !vehicle.description.is_empty() {
        content.push(Line::from(""));
        content.push(Line::from(vec![Span::styled("  DESCRIPTION", section)]));
        content.push(Line::from(Span::styled(
            format!("  {}", vehicle.description),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    let detail_panel = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(detail_panel, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(
            vec![
                Vehicle::new("Toyota", "Corolla", 2018, 14500.0, ""),
                Vehicle::new("Ford", "F-150", 2021, 38900.0, ""),
                Vehicle::new("toyota", "RAV4", 2022, 29900.0, ""),
            ],
            PriceCalculator::with_reference_year(2024),
        )
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        assert_eq!(app.state.selected(), Some(0));

        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));

        app.page_down();
        assert_eq!(app.state.selected(), Some(2));
        app.page_up();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_make_filter_from_analytics() {
        let mut app = app();
        app.next_page();
        assert_eq!(app.current_page, Page::Analytics);

        // makes are key-sorted: Ford, Toyota, toyota
        app.next();
        assert_eq!(app.selected_make().map(String::as_str), Some("Toyota"));

        let make = app.selected_make().cloned();
        app.apply_make_filter(make);
        assert_eq!(app.filtered_vehicles.len(), 2);
        assert_eq!(app.selected_vehicle().map(|v| v.model.as_str()), Some("Corolla"));

        app.clear_filter();
        assert_eq!(app.filtered_vehicles.len(), 3);
        assert_eq!(app.make_filter, None);
    }

    #[test]
    fn test_empty_inventory() {
        let mut app = App::new(Vec::new(), PriceCalculator::with_reference_year(2024));
        app.next();
        app.page_down();
        assert!(app.selected_vehicle().is_none());
        assert!(app.selected_make().is_none());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Corolla", 10), "Corolla");
        assert_eq!(truncate("Grand Cherokee Limited", 10), "Grand C...");
    }
}
