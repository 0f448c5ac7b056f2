use std::path::Path;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use chatter_client::{AuthGateway, CallKind, CallLauncher, ChannelDirectory, MessagePipeline};
use chatter_types::models::{Channel, Message, Session};

use crate::forms::SignupForm;

type Input = Lines<BufReader<Stdin>>;

enum ChatExit {
    Back,
    Quit,
}

pub struct Screens {
    auth: AuthGateway,
    directory: ChannelDirectory,
    pipeline: MessagePipeline,
    calls: CallLauncher,
}

impl Screens {
    pub fn new(
        auth: AuthGateway,
        directory: ChannelDirectory,
        pipeline: MessagePipeline,
        calls: CallLauncher,
    ) -> Self {
        Self {
            auth,
            directory,
            pipeline,
            calls,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut input = BufReader::new(tokio::io::stdin()).lines();

        let Some(session) = self.auth_screen(&mut input).await? else {
            return Ok(());
        };

        self.home_screen(&mut input, &session).await
    }

    async fn auth_screen(&self, input: &mut Input) -> Result<Option<Session>> {
        loop {
            println!();
            println!("login | signup | quit");
            let Some(line) = prompt(input, "> ").await? else {
                return Ok(None);
            };

            match line.trim() {
                "login" => {
                    let Some(email) = prompt(input, "email: ").await? else {
                        return Ok(None);
                    };
                    let Some(password) = prompt(input, "password: ").await? else {
                        return Ok(None);
                    };

                    match self.auth.login(email.trim(), &password).await {
                        Ok(session) => {
                            println!("Login successful");
                            return Ok(Some(session));
                        }
                        Err(e) => println!("Login failed: {e:#}"),
                    }
                }
                "signup" => {
                    let mut form = SignupForm::default();
                    let Some(name) = prompt(input, "name: ").await? else {
                        return Ok(None);
                    };
                    form.set_name(&name);
                    let Some(email) = prompt(input, "email: ").await? else {
                        return Ok(None);
                    };
                    form.set_email(&email);
                    let Some(password) = prompt(input, "password: ").await? else {
                        return Ok(None);
                    };
                    form.set_password(&password);
                    let Some(confirm) = prompt(input, "confirm password: ").await? else {
                        return Ok(None);
                    };
                    form.set_confirm_password(&confirm);

                    if !form.validate() {
                        for error in [
                            &form.email_error,
                            &form.password_error,
                            &form.confirm_password_error,
                        ]
                        .into_iter()
                        .flatten()
                        {
                            println!("  {error}");
                        }
                        continue;
                    }

                    match self
                        .auth
                        .signup(form.name(), form.email(), form.password())
                        .await
                    {
                        Ok(session) => {
                            println!("Signup successful");
                            return Ok(Some(session));
                        }
                        Err(e) => println!("Signup failed: {e:#}"),
                    }
                }
                "quit" => return Ok(None),
                other => println!("unknown command '{other}'"),
            }
        }
    }

    async fn home_screen(&self, input: &mut Input, session: &Session) -> Result<()> {
        loop {
            println!();
            println!("Channels: /add <name>, /open <number>, /quit");

            let mut feed = self.directory.channels(session);
            let mut channels: Vec<Channel> = Vec::new();

            let selected = loop {
                tokio::select! {
                    update = feed.next() => match update {
                        Some(Ok(list)) => {
                            channels = list;
                            render_channels(&channels);
                        }
                        Some(Err(e)) => {
                            println!("channel list closed: {e}");
                            return Ok(());
                        }
                        None => return Ok(()),
                    },
                    line = input.next_line() => {
                        let Some(line) = line? else { return Ok(()) };
                        let line = line.trim().to_string();

                        if let Some(name) = line.strip_prefix("/add ") {
                            match self.directory.add_channel(name.trim(), session).await {
                                Ok(()) => println!("Channel added successfully"),
                                Err(e) => println!("Error: {e:#}"),
                            }
                        } else if let Some(number) = line.strip_prefix("/open ") {
                            let picked = number
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|n| n.checked_sub(1))
                                .and_then(|n| channels.get(n));
                            match picked {
                                Some(channel) => break channel.clone(),
                                None => println!("no such channel"),
                            }
                        } else if line == "/quit" {
                            return Ok(());
                        } else if !line.is_empty() {
                            println!("unknown command '{line}'");
                        }
                    }
                }
            };

            // The chat screen owns the input now; release the list listener
            // until we come back.
            feed.cancel();

            match self.chat_screen(input, session, &selected).await? {
                ChatExit::Back => continue,
                ChatExit::Quit => return Ok(()),
            }
        }
    }

    async fn chat_screen(
        &self,
        input: &mut Input,
        session: &Session,
        channel: &Channel,
    ) -> Result<ChatExit> {
        println!();
        println!(
            "-- {}: type to send, /image <path>, /voice, /video, /back",
            channel.name
        );

        let mut feed = self.pipeline.messages(&channel.id, session);

        let exit = loop {
            tokio::select! {
                update = feed.next() => match update {
                    Some(Ok(messages)) => render_messages(&messages),
                    Some(Err(e)) => {
                        println!("message feed closed: {e}");
                        break ChatExit::Back;
                    }
                    None => break ChatExit::Back,
                },
                line = input.next_line() => {
                    let Some(line) = line? else { break ChatExit::Quit };
                    let line = line.trim().to_string();

                    if line == "/back" {
                        break ChatExit::Back;
                    } else if let Some(path) = line.strip_prefix("/image ") {
                        if let Err(e) = self
                            .pipeline
                            .send_image(Path::new(path.trim()), &channel.id, &channel.name, session)
                            .await
                        {
                            println!("image send failed: {e:#}");
                        }
                    } else if line == "/voice" || line == "/video" {
                        let kind = if line == "/video" {
                            CallKind::Video
                        } else {
                            CallKind::Voice
                        };
                        // Launch failures are not shown on the screen.
                        if let Err(e) = self.calls.start_call(&channel.id, session, kind) {
                            warn!("call launch failed: {e:#}");
                        }
                    } else if !line.is_empty() {
                        if let Err(e) = self
                            .pipeline
                            .send_text(&line, &channel.id, &channel.name, session)
                            .await
                        {
                            println!("send failed: {e:#}");
                        }
                    }
                }
            }
        };

        feed.cancel();
        Ok(exit)
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<Option<String>> {
    use std::io::Write;
    print!("{label}");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}

fn render_channels(channels: &[Channel]) {
    if channels.is_empty() {
        println!("(no channels yet)");
        return;
    }
    for (i, channel) in channels.iter().enumerate() {
        println!("{:>3}. {}", i + 1, channel.name);
    }
}

fn render_messages(messages: &[Message]) {
    println!("----");
    for message in messages {
        match &message.image_url {
            Some(url) => println!("{}: [image] {url}", message.sender_name),
            None => println!(
                "{}: {}",
                message.sender_name,
                message.message.as_deref().unwrap_or("")
            ),
        }
    }
}
