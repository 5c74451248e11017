use crate::types::Avatar;
use rand::Rng;
use std::collections::HashSet;

/// (emoji, color, name)
pub const AVATAR_PALETTE: &[(&str, &str, &str)] = &[
    // Animals
    ("🐶", "bg-amber-200", "Puppy"),
    ("🐱", "bg-orange-200", "Kitty"),
    ("🐸", "bg-green-200", "Frog"),
    ("🐼", "bg-gray-300", "Panda"),
    ("🦊", "bg-orange-300", "Fox"),
    ("🐺", "bg-gray-400", "Wolf"),
    ("🐨", "bg-gray-300", "Koala"),
    ("🦁", "bg-yellow-300", "Lion"),
    // Fantasy
    ("🦄", "bg-purple-200", "Unicorn"),
    ("🐉", "bg-red-200", "Dragon"),
    ("🧙‍♂️", "bg-indigo-300", "Wizard"),
    ("🧚‍♀️", "bg-pink-200", "Fairy"),
    // Characters
    ("🤖", "bg-blue-200", "Robot"),
    ("👾", "bg-purple-300", "Alien"),
    ("🎭", "bg-red-200", "Actor"),
    ("🎪", "bg-yellow-200", "Circus"),
    // Food
    ("🍕", "bg-orange-200", "Pizza"),
    ("🍔", "bg-yellow-300", "Burger"),
    ("🍩", "bg-pink-200", "Donut"),
    ("🌮", "bg-orange-300", "Taco"),
    // Ocean
    ("🐙", "bg-purple-200", "Octopus"),
    ("🐠", "bg-blue-200", "Fish"),
    ("🦈", "bg-gray-300", "Shark"),
    ("🐳", "bg-blue-300", "Whale"),
];

/// Pick a random avatar, preferring emoji nobody in the room is using.
/// Once the palette is exhausted duplicates are allowed.
pub fn allocate_avatar(used_emoji: &HashSet<&str>) -> Avatar {
    let available: Vec<_> = AVATAR_PALETTE
        .iter()
        .filter(|(emoji, _, _)| !used_emoji.contains(emoji))
        .collect();

    let pool: Vec<_> = if available.is_empty() {
        AVATAR_PALETTE.iter().collect()
    } else {
        available
    };

    let mut rng = rand::rng();
    let (emoji, color, name) = pool[rng.random_range(0..pool.len())];

    Avatar {
        emoji: emoji.to_string(),
        color: color.to_string(),
        name: name.to_string(),
    }
}
