mod screens;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::debug::DebugStats;
use crate::net::{ClientConfig, ConnectState, InputState, NetworkClient};

pub use screens::Screen;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Connect(SocketAddr),
    Disconnect,
    ChangeScreen(Screen),
}

pub struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    screen: Screen,
    client: Option<NetworkClient>,
    connect_input: String,
    connect_error: Option<String>,
    selected_index: usize,
    should_quit: bool,
    name: String,
    input_state: InputState,
    last_frame: Instant,
    debug: DebugStats,
}

impl Tui {
    pub fn new(name: String) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            screen: Screen::MainMenu,
            client: None,
            connect_input: format!("127.0.0.1:{}", gloop::constants::NETWORK_PORT),
            connect_error: None,
            selected_index: 0,
            should_quit: false,
            name,
            input_state: InputState::default(),
            last_frame: Instant::now(),
            debug: DebugStats::new(),
        })
    }

    /// Skips the menu and dials `addr` directly, for `--server` launches.
    pub fn connect_immediately(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.connect_to_server(addr)
    }

    pub fn run(&mut self) -> io::Result<()> {
        while !self.should_quit {
            self.draw()?;

            let dt = self.last_frame.elapsed().as_secs_f32();
            self.last_frame = Instant::now();
            self.debug.record_frame(dt);
            self.input_state = InputState::default();

            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        let action = self.handle_key(key.code, key.modifiers);
                        self.process_action(action)?;
                    }
                }
            }

            if let Some(client) = &mut self.client {
                client.set_local_input(self.input_state.to_inputs());
                let _ = client.tick(dt);
                self.debug.record_tick();

                match client.state() {
                    ConnectState::Connected => {
                        if self.screen != Screen::InGame {
                            self.screen = Screen::InGame;
                        }
                    }
                    ConnectState::Denied(reason) => {
                        self.connect_error = Some(reason.clone());
                        self.client = None;
                        self.screen = Screen::Connect;
                    }
                    ConnectState::TimedOut => {
                        self.connect_error = Some("Server did not respond.".to_string());
                        self.client = None;
                        self.screen = Screen::Connect;
                    }
                    ConnectState::Connecting => {}
                }
            }
        }

        Ok(())
    }

    fn draw(&mut self) -> io::Result<()> {
        let screen = self.screen;
        let selected = self.selected_index;
        let connect_input = self.connect_input.clone();
        let connect_error = self.connect_error.clone();
        let client = &self.client;
        let fps = self.debug.fps();
        let tick_rate = self.debug.tick_rate();

        self.terminal.draw(|frame| {
            screens::render(
                frame,
                screen,
                selected,
                &connect_input,
                connect_error.as_deref(),
                client,
                fps,
                tick_rate,
            );
        })?;

        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Action {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return Action::Quit;
        }

        match self.screen {
            Screen::MainMenu => self.handle_main_menu_key(code),
            Screen::Connect => self.handle_connect_key(code),
            Screen::Connecting => self.handle_connecting_key(code),
            Screen::InGame => self.handle_in_game_key(code),
        }
    }

    fn handle_main_menu_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_index = self.selected_index.saturating_sub(1);
                Action::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected_index = (self.selected_index + 1).min(1);
                Action::None
            }
            KeyCode::Enter => match self.selected_index {
                0 => Action::ChangeScreen(Screen::Connect),
                1 => Action::Quit,
                _ => Action::None,
            },
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            _ => Action::None,
        }
    }

    fn handle_connect_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Esc => {
                self.connect_error = None;
                Action::ChangeScreen(Screen::MainMenu)
            }
            KeyCode::Enter => match self.connect_input.to_socket_addrs() {
                Ok(mut addrs) => match addrs.next() {
                    Some(addr) => {
                        self.connect_error = None;
                        Action::Connect(addr)
                    }
                    None => {
                        self.connect_error = Some("Invalid address format".to_string());
                        Action::None
                    }
                },
                Err(_) => {
                    self.connect_error = Some("Invalid address format".to_string());
                    Action::None
                }
            },
            KeyCode::Backspace => {
                self.connect_input.pop();
                Action::None
            }
            KeyCode::Char(c) => {
                if c.is_ascii_alphanumeric() || c == '.' || c == ':' {
                    self.connect_input.push(c);
                }
                Action::None
            }
            _ => Action::None,
        }
    }

    fn handle_connecting_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Esc => {
                self.client = None;
                Action::ChangeScreen(Screen::MainMenu)
            }
            _ => Action::None,
        }
    }

    fn handle_in_game_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => {
                self.input_state.up = true;
                Action::None
            }
            KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => {
                self.input_state.down = true;
                Action::None
            }
            KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => {
                self.input_state.left = true;
                Action::None
            }
            KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => {
                self.input_state.right = true;
                Action::None
            }
            KeyCode::Char('q') | KeyCode::Esc => Action::Disconnect,
            _ => Action::None,
        }
    }

    fn process_action(&mut self, action: Action) -> io::Result<()> {
        match action {
            Action::None => {}
            Action::Quit => {
                if let Some(client) = &mut self.client {
                    let _ = client.send_disconnect();
                }
                self.should_quit = true;
            }
            Action::Connect(addr) => {
                self.connect_to_server(addr)?;
            }
            Action::Disconnect => {
                if let Some(client) = &mut self.client {
                    let _ = client.send_disconnect();
                }
                self.client = None;
                self.screen = Screen::MainMenu;
                self.selected_index = 0;
            }
            Action::ChangeScreen(screen) => {
                self.screen = screen;
                self.selected_index = 0;
            }
        }

        Ok(())
    }

    fn connect_to_server(&mut self, addr: SocketAddr) -> io::Result<()> {
        let config = ClientConfig {
            name: self.name.clone(),
        };
        let client = NetworkClient::new(&config, addr)?;

        self.client = Some(client);
        self.screen = Screen::Connecting;

        Ok(())
    }

    pub fn restore_terminal(&mut self) -> io::Result<()> {
        terminal::disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            cursor::Show
        )?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = self.restore_terminal();
    }
}

pub fn run(name: String) -> io::Result<()> {
    let mut tui = Tui::new(name)?;
    let result = tui.run();
    tui.restore_terminal()?;
    result
}

/// Skips the main menu and dials `addr` directly, for `--server` launches.
pub fn run_connected(name: String, addr: SocketAddr) -> io::Result<()> {
    let mut tui = Tui::new(name)?;
    tui.connect_immediately(addr)?;
    let result = tui.run();
    tui.restore_terminal()?;
    result
}
