use iced::{
    alignment,
    widget::{button, column, container, row, scrollable, text, text_input, text_input::Id, Column},
    time, Color, Element, Length, Subscription, Task, Theme,
};
use std::time::Duration;

use crate::catalog::{Selection, TopicCatalog};
use crate::chat::{ChatBridge, ChatLog, ChatTurn, Speaker, CHAT_GREETING};
use crate::render;

pub const TITLE: &str = "Civic Education System";

const BACKGROUND_PERIOD: Duration = Duration::from_millis(3000);
const SPINNER_PERIOD: Duration = Duration::from_millis(80);
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const PASTELS: [[u8; 3]; 6] = [
    [0xFD, 0xED, 0xEC],
    [0xE8, 0xF8, 0xF5],
    [0xEB, 0xF5, 0xFB],
    [0xFE, 0xF9, 0xE7],
    [0xF5, 0xEE, 0xF8],
    [0xF9, 0xEB, 0xEA],
];

const HEADER_BACKGROUND: [u8; 3] = [0xD6, 0xEA, 0xF8];
const HEADER_TEXT: [u8; 3] = [0x2E, 0x40, 0x53];
const ERROR_TEXT: [u8; 3] = [0xC0, 0x39, 0x2B];

fn rgb([r, g, b]: [u8; 3]) -> Color {
    Color::from_rgb8(r, g, b)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Rendered body of the selected topic.
    Topic(String),
    Chat,
}

/// Everything the window shows. Handlers mutate it; nothing here touches the network.
#[derive(Debug)]
pub struct AppState {
    catalog: TopicCatalog,
    search: String,
    visible: Vec<String>,
    selected: Option<String>,
    view: View,
    chat_log: ChatLog,
    chat_input: String,
    pending: bool,
    spinner_frame: usize,
    palette_index: usize,
}

impl AppState {
    /// Lists every entry and selects the first one.
    pub fn new(catalog: TopicCatalog) -> Self {
        let visible = catalog.filter("");
        let mut state = AppState {
            catalog,
            search: String::new(),
            visible,
            selected: None,
            view: View::Topic(String::new()),
            chat_log: ChatLog::default(),
            chat_input: String::new(),
            pending: false,
            spinner_frame: 0,
            palette_index: 0,
        };

        if let Some(first) = state.visible.first().cloned() {
            state.select(&first);
        }
        state
    }

    pub fn set_search(&mut self, query: String) {
        self.visible = self.catalog.filter(&query);
        self.search = query;
    }

    pub fn select(&mut self, name: &str) {
        self.view = match self.catalog.select(name) {
            Selection::Chat => {
                self.chat_log = ChatLog::with_greeting(CHAT_GREETING);
                View::Chat
            }
            Selection::Topic(content) => View::Topic(render::html_to_text(content)),
        };
        self.selected = Some(name.to_string());
    }

    pub fn set_chat_input(&mut self, value: String) {
        self.chat_input = value;
    }

    /// Take the typed message for sending. `None` when blank or a reply is
    /// still outstanding.
    pub fn take_chat_message(&mut self) -> Option<String> {
        let message = self.chat_input.trim().to_string();
        if message.is_empty() || self.pending {
            return None;
        }

        self.chat_log.push(ChatTurn::user(message.clone()));
        self.chat_input.clear();
        self.pending = true;
        self.spinner_frame = 0;
        Some(message)
    }

    pub fn receive_reply(&mut self, reply: String) {
        self.chat_log.push(ChatTurn::from_reply(reply));
        self.pending = false;
    }

    pub fn advance_spinner(&mut self) {
        if self.pending {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
        }
    }

    pub fn advance_background(&mut self) {
        self.palette_index = (self.palette_index + 1) % PASTELS.len();
    }

    pub fn background(&self) -> Color {
        rgb(PASTELS[self.palette_index])
    }

    pub fn visible(&self) -> &[String] {
        &self.visible
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn chat_log(&self) -> &ChatLog {
        &self.chat_log
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    SearchChanged(String),
    TopicSelected(String),
    ChatInputChanged(String),
    ChatSubmit,
    ReplyReceived(String),
    Tick,
    CycleBackground,
}

pub struct App {
    state: AppState,
    bridge: ChatBridge,
    search_id: Id,
    chat_input_id: Id,
}

impl App {
    pub fn new(catalog: TopicCatalog, bridge: ChatBridge) -> (Self, Task<Message>) {
        let search_id = Id::unique();

        let app = App {
            state: AppState::new(catalog),
            bridge,
            search_id: search_id.clone(),
            chat_input_id: Id::unique(),
        };

        (app, text_input::focus(search_id))
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::SearchChanged(query) => {
                self.state.set_search(query);
                Task::none()
            }
            Message::TopicSelected(name) => {
                self.state.select(&name);
                if *self.state.view() == View::Chat {
                    text_input::focus(self.chat_input_id.clone())
                } else {
                    Task::none()
                }
            }
            Message::ChatInputChanged(value) => {
                self.state.set_chat_input(value);
                Task::none()
            }
            Message::ChatSubmit => {
                let Some(prompt) = self.state.take_chat_message() else {
                    return Task::none();
                };

                let bridge = self.bridge.clone();
                Task::future(async move { Message::ReplyReceived(bridge.ask(&prompt).await) })
            }
            Message::ReplyReceived(reply) => {
                self.state.receive_reply(reply);
                Task::none()
            }
            Message::Tick => {
                self.state.advance_spinner();
                Task::none()
            }
            Message::CycleBackground => {
                self.state.advance_background();
                Task::none()
            }
        }
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let background = time::every(BACKGROUND_PERIOD).map(|_| Message::CycleBackground);

        let spinner = if self.state.is_pending() {
            time::every(SPINNER_PERIOD).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        Subscription::batch([background, spinner])
    }

    pub fn view(&self) -> Element<Message> {
        let header = container(text(format!("📘 {}", TITLE)).size(30).color(rgb(HEADER_TEXT)))
            .width(Length::Fill)
            .padding(16)
            .align_x(alignment::Horizontal::Center)
            .style(|_theme: &Theme| container::Style {
                background: Some(rgb(HEADER_BACKGROUND).into()),
                ..Default::default()
            });

        let body = row![
            container(self.sidebar()).width(Length::FillPortion(2)).height(Length::Fill),
            container(self.content())
                .width(Length::FillPortion(5))
                .height(Length::Fill)
                .padding(10),
        ]
        .spacing(10);

        let background = self.state.background();
        container(column![header, body].spacing(10))
            .width(Length::Fill)
            .height(Length::Fill)
            .style(move |_theme: &Theme| container::Style {
                background: Some(background.into()),
                ..Default::default()
            })
            .into()
    }

    fn sidebar(&self) -> Element<Message> {
        let search = text_input("Search topics...", &self.state.search)
            .on_input(Message::SearchChanged)
            .padding(12)
            .size(16)
            .id(self.search_id.clone());

        let entries: Vec<Element<Message>> = self
            .state
            .visible()
            .iter()
            .map(|name| {
                let style = if self.state.selected() == Some(name.as_str()) {
                    button::primary
                } else {
                    button::text
                };

                Element::from(
                    button(text(name.as_str()).size(16))
                        .on_press(Message::TopicSelected(name.clone()))
                        .width(Length::Fill)
                        .padding(8)
                        .style(style),
                )
            })
            .collect();

        column![search, scrollable(Column::with_children(entries).spacing(2)).height(Length::Fill)]
            .spacing(10)
            .padding(10)
            .into()
    }

    fn content(&self) -> Element<Message> {
        match self.state.view() {
            View::Topic(body) => scrollable(container(text(body.as_str()).size(16)).padding(24).width(Length::Fill))
                .height(Length::Fill)
                .into(),
            View::Chat => self.chat_panel(),
        }
    }

    fn chat_panel(&self) -> Element<Message> {
        let log = self.state.chat_log();
        let mut lines: Vec<Element<Message>> = Vec::new();

        if let Some(greeting) = log.greeting() {
            lines.push(text(format!("✨ {}", greeting)).size(15).into());
        }

        for turn in log.turns() {
            let line = text(format!("{}: {}", turn.speaker.label(), turn.message)).size(15);
            let line = if turn.speaker == Speaker::SystemError {
                line.color(rgb(ERROR_TEXT))
            } else {
                line
            };
            lines.push(line.into());
        }

        if self.state.is_pending() {
            lines.push(text(format!("{} Thinking...", SPINNER_FRAMES[self.state.spinner_frame])).size(15).into());
        }

        let input = text_input("Ask your civic question...", &self.state.chat_input)
            .on_input(Message::ChatInputChanged)
            .on_submit(Message::ChatSubmit)
            .padding(12)
            .size(15)
            .id(self.chat_input_id.clone());

        let send = button(text("Send").size(15))
            .padding([12, 24])
            .on_press_maybe((!self.state.is_pending()).then_some(Message::ChatSubmit));

        column![
            scrollable(Column::with_children(lines).spacing(8).padding(20).width(Length::Fill)).height(Length::Fill),
            row![input, send].spacing(8),
        ]
        .spacing(10)
        .into()
    }

    pub fn theme(&self) -> Theme {
        Theme::Light
    }
}
