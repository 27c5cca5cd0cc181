use std::collections::HashSet;

/// Everything the recommender needs: library, history, playlists and playback.
pub const SCOPES: [&str; 12] = [
    "user-library-read",
    "user-read-recently-played",
    "user-top-read",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "user-read-email",
    "user-read-private",
];

/// The scope set in the shape `OAuth` wants it.
pub fn scope_set() -> HashSet<String> {
    SCOPES.iter().map(|scope| scope.to_string()).collect()
}

/// Space separated, in request order.
pub fn display() -> String {
    SCOPES.join(" ")
}
