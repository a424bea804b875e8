use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    audio::{songbird_voice::SongbirdConnector, Enqueued, PauseToggle},
    bot::{commands::Command, JukeboxBot},
    ui::embeds,
};

/// Runs one parsed command for the guild the message came from.
pub async fn handle_command(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    command: Command,
    bot: &JukeboxBot,
) -> Result<()> {
    info!(
        "📝 {:?} from {} in guild {}",
        command, msg.author.name, guild_id
    );

    match command {
        Command::Play(query) => handle_play(ctx, msg, guild_id, &query, bot).await?,
        Command::Skip(count) => {
            let skipped = bot.controller.skip(guild_id, count).await?;
            let noun = if skipped == 1 { "song" } else { "songs" };
            say(ctx, msg, format!("⏭️ Skipped {} {}.", skipped, noun)).await?;
        }
        Command::SkipTo(name) => {
            let target = bot.controller.jump_to(guild_id, &name).await?;
            say(
                ctx,
                msg,
                format!("⏩ Skipping to **{}**.", embeds::escape_markdown(target.title())),
            )
            .await?;
        }
        Command::Remove(name) => {
            let removed = bot.controller.remove(guild_id, &name).await?;
            say(
                ctx,
                msg,
                format!(
                    "🗑️ Removed **{}** from the queue.",
                    embeds::escape_markdown(removed.title())
                ),
            )
            .await?;
        }
        Command::Shuffle => {
            bot.controller.shuffle(guild_id).await?;
            say(ctx, msg, "🔀 Queue shuffled.").await?;
        }
        Command::Toggle => {
            let text = match bot.controller.toggle_pause(guild_id).await? {
                PauseToggle::Idle => "Nothing is playing.",
                PauseToggle::Paused => "⏸️ Paused.",
                PauseToggle::Resumed => "▶️ Resumed.",
            };
            say(ctx, msg, text).await?;
        }
        Command::Volume(percent) => {
            bot.controller.set_volume(guild_id, percent).await?;
            say(ctx, msg, format!("🔊 Volume set to {}%.", percent)).await?;
        }
        Command::Queue => {
            let snapshot = bot.controller.snapshot(guild_id).await;
            send_embed(ctx, msg.channel_id, embeds::queue_embed(&snapshot)).await?;
        }
        Command::History => {
            let snapshot = bot.controller.snapshot(guild_id).await;
            send_embed(ctx, msg.channel_id, embeds::history_embed(&snapshot)).await?;
        }
        Command::Stop => {
            bot.controller.stop(guild_id).await?;
            say(ctx, msg, "👋 Stopped and cleared the queue.").await?;
        }
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    query: &str,
    bot: &JukeboxBot,
) -> Result<()> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird not initialised"))?;

    let track = bot.resolver.resolve(query, msg.author.id).await?;
    let title = embeds::escape_markdown(track.title());

    let connector = SongbirdConnector::new(
        manager,
        user_voice_channel(ctx, guild_id, msg.author.id),
        bot.http_client.clone(),
    );

    // Announcements follow whichever channel last asked for music
    bot.announcer.bind(guild_id, msg.channel_id);

    match bot
        .controller
        .enqueue_or_start(guild_id, track, &connector)
        .await?
    {
        Enqueued::Started => {}
        Enqueued::Queued { position } => {
            say(
                ctx,
                msg,
                format!("➕ Added **{}** to the queue (#{}).", title, position),
            )
            .await?;
        }
    }

    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

async fn say(ctx: &Context, msg: &Message, text: impl Into<String>) -> Result<()> {
    msg.channel_id.say(&ctx.http, text).await?;
    Ok(())
}

pub async fn send_embed(ctx: &Context, channel_id: ChannelId, embed: CreateEmbed) -> Result<()> {
    channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}
