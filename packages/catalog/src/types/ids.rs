//! External identifier schemes.

use serde::{Deserialize, Serialize};

/// Identifier scheme an external resource or item can be keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    Isbn,
    Isbn10,
    Asin,
    Cubn,
    Gtin,
    Isrc,
    Musicbrainz,
    Rss,
    Imdb,
    Wikidata,
    TmdbTv,
    TmdbSeason,
    TmdbMovie,
    Goodreads,
    GoodreadsWork,
    GoogleBooks,
    DoubanBook,
    DoubanBookWork,
    DoubanMovie,
    DoubanMusic,
    SpotifyAlbum,
    ApplePodcast,
    Bandcamp,
    Steam,
    Igdb,
    Bangumi,
    Fedi,
}

/// Identifier schemes considered authoritative for canonicalization, in
/// preference order. A site-local id is never preferred over any of these.
pub const IDEAL_ID_TYPES: &[IdType] = &[
    IdType::Isbn,
    IdType::Cubn,
    IdType::Asin,
    IdType::Gtin,
    IdType::Isrc,
    IdType::Musicbrainz,
    IdType::Rss,
    IdType::Imdb,
    IdType::Steam,
    IdType::Wikidata,
];

impl IdType {
    pub const ALL: &'static [IdType] = &[
        IdType::Isbn,
        IdType::Isbn10,
        IdType::Asin,
        IdType::Cubn,
        IdType::Gtin,
        IdType::Isrc,
        IdType::Musicbrainz,
        IdType::Rss,
        IdType::Imdb,
        IdType::Wikidata,
        IdType::TmdbTv,
        IdType::TmdbSeason,
        IdType::TmdbMovie,
        IdType::Goodreads,
        IdType::GoodreadsWork,
        IdType::GoogleBooks,
        IdType::DoubanBook,
        IdType::DoubanBookWork,
        IdType::DoubanMovie,
        IdType::DoubanMusic,
        IdType::SpotifyAlbum,
        IdType::ApplePodcast,
        IdType::Bandcamp,
        IdType::Steam,
        IdType::Igdb,
        IdType::Bangumi,
        IdType::Fedi,
    ];

    /// Stable lowercase name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            IdType::Isbn => "isbn",
            IdType::Isbn10 => "isbn10",
            IdType::Asin => "asin",
            IdType::Cubn => "cubn",
            IdType::Gtin => "gtin",
            IdType::Isrc => "isrc",
            IdType::Musicbrainz => "musicbrainz",
            IdType::Rss => "rss",
            IdType::Imdb => "imdb",
            IdType::Wikidata => "wikidata",
            IdType::TmdbTv => "tmdb_tv",
            IdType::TmdbSeason => "tmdb_season",
            IdType::TmdbMovie => "tmdb_movie",
            IdType::Goodreads => "goodreads",
            IdType::GoodreadsWork => "goodreads_work",
            IdType::GoogleBooks => "google_books",
            IdType::DoubanBook => "douban_book",
            IdType::DoubanBookWork => "douban_book_work",
            IdType::DoubanMovie => "douban_movie",
            IdType::DoubanMusic => "douban_music",
            IdType::SpotifyAlbum => "spotify_album",
            IdType::ApplePodcast => "apple_podcast",
            IdType::Bandcamp => "bandcamp",
            IdType::Steam => "steam",
            IdType::Igdb => "igdb",
            IdType::Bangumi => "bangumi",
            IdType::Fedi => "fedi",
        }
    }

    pub fn parse(name: &str) -> Option<IdType> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn is_ideal(self) -> bool {
        IDEAL_ID_TYPES.contains(&self)
    }
}

impl std::fmt::Display for IdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_variant() {
        for t in IdType::ALL {
            assert_eq!(IdType::parse(t.as_str()), Some(*t));
        }
        assert_eq!(IdType::parse("nope"), None);
    }

    #[test]
    fn as_str_matches_serde_name() {
        for t in IdType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, serde_json::Value::String(t.as_str().to_string()));
        }
    }

    #[test]
    fn site_local_ids_are_not_ideal() {
        assert!(IdType::Isbn.is_ideal());
        assert!(IdType::Imdb.is_ideal());
        assert!(!IdType::Goodreads.is_ideal());
        assert!(!IdType::DoubanMovie.is_ideal());
    }
}
