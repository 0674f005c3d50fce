use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Circle};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph};

use crate::net::{ConnectState, NetworkClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    MainMenu,
    Connect,
    Connecting,
    InGame,
}

pub fn render(
    frame: &mut Frame,
    screen: Screen,
    selected: usize,
    connect_input: &str,
    connect_error: Option<&str>,
    client: &Option<NetworkClient>,
    fps: f32,
    tick_rate: f32,
) {
    let area = frame.area();

    let block = Block::default()
        .title(" Gloop ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(block, area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([Constraint::Min(0)])
        .split(area)[0];

    match screen {
        Screen::MainMenu => render_main_menu(frame, inner, selected),
        Screen::Connect => render_connect(frame, inner, connect_input, connect_error),
        Screen::Connecting => render_connecting(frame, inner, client),
        Screen::InGame => render_in_game(frame, inner, client, fps, tick_rate),
    }
}

fn render_main_menu(frame: &mut Frame, area: Rect, selected: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(2),
        ])
        .split(area);

    let title = r#"
  ____ _
 / ___| | ___   ___  _ __
| |  _| |/ _ \ / _ \| '_ \
| |_| | | (_) | (_) | |_) |
 \____|_|\___/ \___/| .__/
                     |_|
"#;

    let title_widget = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center);
    frame.render_widget(title_widget, chunks[0]);

    let menu_items = vec![ListItem::new("  Connect to Server"), ListItem::new("  Quit")];

    let menu_items: Vec<ListItem> = menu_items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if i == selected {
                item.style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                item.style(Style::default().fg(Color::White))
            }
        })
        .collect();

    let menu = List::new(menu_items).block(
        Block::default()
            .title(" Menu ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    let menu_area = centered_rect(40, 6, chunks[2]);
    frame.render_widget(menu, menu_area);

    let help = Paragraph::new("↑↓ Navigate  Enter Select  Q Quit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, chunks[3]);
}

fn render_connect(frame: &mut Frame, area: Rect, input: &str, error: Option<&str>) {
    let dialog_area = centered_rect(50, 10, area);
    frame.render_widget(Clear, dialog_area);

    let dialog = Block::default()
        .title(" Connect to Server ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(dialog, dialog_area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(dialog_area);

    let label = Paragraph::new("Server Address:").style(Style::default().fg(Color::White));
    frame.render_widget(label, inner[0]);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let input_text = Paragraph::new(format!("{}_", input))
        .style(Style::default().fg(Color::White))
        .block(input_block);
    frame.render_widget(input_text, inner[1]);

    if let Some(err) = error {
        let error_text = Paragraph::new(err)
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center);
        frame.render_widget(error_text, inner[2]);
    }

    let help = Paragraph::new("Enter Connect  Esc Cancel")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, inner[3]);
}

fn render_connecting(frame: &mut Frame, area: Rect, client: &Option<NetworkClient>) {
    let dialog_area = centered_rect(40, 8, area);
    frame.render_widget(Clear, dialog_area);

    let dialog = Block::default()
        .title(" Connecting ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    frame.render_widget(dialog, dialog_area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(dialog_area);

    let status = match client.as_ref().map(|c| c.state()) {
        Some(ConnectState::Connecting) => "Awaiting server response...".to_string(),
        Some(ConnectState::TimedOut) => "No response from server.".to_string(),
        Some(ConnectState::Denied(reason)) => format!("Denied: {reason}"),
        Some(ConnectState::Connected) | None => "Please wait...".to_string(),
    };

    let status_text = Paragraph::new(status)
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center);
    frame.render_widget(status_text, inner[0]);

    let help = Paragraph::new("Esc Cancel")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, inner[1]);
}

fn render_in_game(
    frame: &mut Frame,
    area: Rect,
    client: &Option<NetworkClient>,
    fps: f32,
    tick_rate: f32,
) {
    let Some(client) = client.as_ref() else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(area);

    render_field(frame, chunks[0], client);
    render_sidebar(frame, chunks[1], client, fps, tick_rate);
}

const VIEW_RADIUS: f64 = 900.0;

fn render_field(frame: &mut Frame, area: Rect, client: &NetworkClient) {
    let block = Block::default().borders(Borders::ALL).title(" Field ");
    let Some(player_id) = client.player_id() else {
        frame.render_widget(block, area);
        return;
    };
    let Some(local) = client.players().get(&player_id) else {
        frame.render_widget(block, area);
        return;
    };
    let (cx, cy) = (local.x as f64, local.y as f64);

    let players: Vec<_> = client.players().values().cloned().collect();
    let orbs: Vec<_> = client.orbs().values().cloned().collect();

    let canvas = Canvas::default()
        .block(block)
        .x_bounds([cx - VIEW_RADIUS, cx + VIEW_RADIUS])
        .y_bounds([cy - VIEW_RADIUS, cy + VIEW_RADIUS])
        .paint(move |ctx| {
            for orb in &orbs {
                ctx.draw(&Circle {
                    x: orb.x as f64,
                    y: orb.y as f64,
                    radius: orb.radius as f64,
                    color: palette_color(orb.color_idx),
                });
            }
            for player in &players {
                ctx.draw(&Circle {
                    x: player.x as f64,
                    y: player.y as f64,
                    radius: player.radius as f64,
                    color: if player.id == player_id {
                        Color::White
                    } else {
                        palette_color(player.color_idx)
                    },
                });
                ctx.print(
                    player.x as f64,
                    player.y as f64 + player.radius as f64 + 20.0,
                    Span::styled(player.name.clone(), Style::default().fg(Color::Gray)),
                );
            }
        });
    frame.render_widget(canvas, area);
}

fn render_sidebar(
    frame: &mut Frame,
    area: Rect,
    client: &NetworkClient,
    fps: f32,
    tick_rate: f32,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(0), Constraint::Length(2)])
        .split(area);

    let (field_w, field_h) = client.field_size();
    let stats_lines = vec![
        Line::from(format!("Players: {}", client.players().len())),
        Line::from(format!("Orbs: {}", client.orbs().len())),
        Line::from(format!("Latency: {:.0}ms", client.latency() * 1000.0)),
        Line::from(format!("Field: {field_w}x{field_h}")),
        Line::from(format!("FPS: {fps:.0}  Tick: {tick_rate:.0}/s")),
    ];
    let stats = Paragraph::new(stats_lines).block(
        Block::default()
            .title(" Stats ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(stats, chunks[0]);

    let leader_items: Vec<ListItem> = client
        .leaders()
        .iter()
        .enumerate()
        .map(|(i, name)| ListItem::new(format!("{}. {}", i + 1, name)))
        .collect();
    let leaders = List::new(leader_items).block(
        Block::default()
            .title(" Leaderboard ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    frame.render_widget(leaders, chunks[1]);

    let help = Paragraph::new("Arrows/WASD move  Q quit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, chunks[2]);
}

fn palette_color(idx: u8) -> Color {
    const PALETTE: [Color; 12] = [
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::LightRed,
        Color::LightGreen,
        Color::LightYellow,
        Color::LightBlue,
        Color::LightMagenta,
        Color::LightCyan,
    ];
    PALETTE[idx as usize % PALETTE.len()]
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}
