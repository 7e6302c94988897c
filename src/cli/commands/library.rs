//! Library commands: add and list artists and albums.

use std::path::PathBuf;

use tokio::runtime::Runtime;

use super::open;
use crate::db;
use crate::model::{EntityType, MetadataField};

/// Add an artist, optionally with a known MBID
pub fn cmd_add_artist(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    name: &str,
    mbid: Option<&str>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let id = db::get_or_create_artist(&pool, name).await?;
        if let Some(mbid) = mbid {
            db::apply_field(&pool, EntityType::Artist, id, MetadataField::Mbid, mbid).await?;
        }
        println!("Artist {}: {}", id, name);
        Ok(())
    })
}

/// Add an album, creating its artist if needed
pub fn cmd_add_album(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    title: &str,
    artist: Option<&str>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let artist_id = match artist {
            Some(name) => Some(db::get_or_create_artist(&pool, name).await?),
            None => None,
        };
        let id = db::get_or_create_album(&pool, title, artist_id).await?;
        println!("Album {}: {}", id, title);
        Ok(())
    })
}

/// List all artists with their enrichment state
pub fn cmd_list(rt: &Runtime, db_path: Option<&PathBuf>) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let artists = db::list_artists(&pool).await?;
        if artists.is_empty() {
            println!("No artists in the library.");
            return Ok(());
        }

        for artist in artists {
            let marks = [
                (artist.mbid.is_some(), "mbid"),
                (artist.biography.is_some(), "bio"),
                (artist.profile_image_url.is_some(), "image"),
                (artist.tags.is_some(), "tags"),
            ];
            let have: Vec<&str> = marks.iter().filter(|(has, _)| *has).map(|(_, n)| *n).collect();
            println!("{:>5}  {}  [{}]", artist.id, artist.name, have.join(", "));
        }
        Ok(())
    })
}
