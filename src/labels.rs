/// Class label tables for the two classifiers.
/// The position of a name is the class index the classifier emits for it,
/// so the order here must match the order the models were trained with.
/// Never sort or deduplicate these tables.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTable
{
    labels: &'static [&'static str],
}

impl LabelTable
{
    pub const fn new(labels: &'static [&'static str]) -> Self
    {
        LabelTable { labels }
    }

    pub fn get(&self, idx: usize) -> Option<&'static str>
    {
        self.labels.get(idx).copied()
    }

    pub fn len(&self) -> usize
    {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool
    {
        self.labels.iter().any(|l| *l == label)
    }

    pub fn as_slice(&self) -> &'static [&'static str]
    {
        self.labels
    }
}

// Food-101 followed by the Indonesian dishes the food model was extended with.
// "Steak" appears twice (indices 93 and 121); both are real output classes.
const FOOD_CLASS_NAMES: [&str; 130] = [
    "Apple pie", "Baby back ribs", "Baklava", "Beef carpaccio", "Beef tartare",
    "Beet salad", "Beignets", "Bibimbap", "Bread pudding", "Breakfast burrito",
    "Bruschetta", "Caesar salad", "Cannoli", "Caprese salad", "Carrot cake",
    "Ceviche", "Cheesecake", "Cheese plate", "Chicken curry", "Chicken quesadilla",
    "Chicken wings", "Chocolate cake", "Chocolate mousse", "Churros", "Clam chowder",
    "Club sandwich", "Crab cakes", "Creme brulee", "Croque madame", "Cup cakes",
    "Deviled eggs", "Donuts", "Dumplings", "Edamame", "Eggs benedict",
    "Escargots", "Falafel", "Filet mignon", "Fish and chips", "Foie gras",
    "French fries", "French onion soup", "French toast", "Fried calamari", "Fried rice",
    "Frozen yogurt", "Garlic bread", "Gnocchi", "Greek salad", "Grilled cheese sandwich",
    "Grilled salmon", "Guacamole", "Gyoza", "Hamburger", "Hot and sour soup",
    "Hot dog", "Huevos rancheros", "Hummus", "Ice cream", "Lasagna",
    "Lobster bisque", "Lobster roll sandwich", "Macaroni and cheese", "Macarons", "Miso soup",
    "Mussels", "Nachos", "Omelette", "Onion rings", "Oysters",
    "Pad thai", "Paella", "Pancakes", "Panna cotta", "Peking duck",
    "Pho", "Pizza", "Pork chop", "Poutine", "Prime rib",
    "Pulled pork sandwich", "Ramen", "Ravioli", "Red velvet cake", "Risotto",
    "Samosa", "Sashimi", "Scallops", "Seaweed salad", "Shrimp and grits",
    "Spaghetti bolognese", "Spaghetti carbonara", "Spring rolls", "Steak", "Strawberry shortcake",
    "Sushi", "Tacos", "Takoyaki", "Tiramisu", "Tuna tartare",
    "Waffles",
    "Ayam bakar", "Ayam goreng", "Bakso", "Bakwan", "Batagor", "Bihun", "Capcay", "Gado-gado",
    "Ikan goreng", "Kerupuk", "Martabak telor", "Mie", "Nasi goreng", "Nasi putih", "Nugget",
    "Opor ayam", "Pempek", "Rendang", "Roti", "Soto", "Steak", "Tahu", "Telur", "Tempe",
    "Terong balado", "Tumis kangkung", "Udang", "Sate", "Sosis",
];

const FRUIT_CLASS_NAMES: [&str; 32] = [
    "Apple", "Apricot", "Avocado", "Banana", "Black Berry", "Blueberry", "Cherry", "Coconut",
    "Cranberry", "Dragonfruit", "Durian", "Grape", "Grapefruit", "Guava", "Jackfruit", "Kiwi",
    "Lemon", "Lime", "Lychee", "Mango", "Mangosteen", "Melon Pear", "Olive", "Orange", "Papaya",
    "Passion Fruit", "Raspberry", "Salak", "Sapodilla", "Strawberry", "Tomato", "Watermelon",
];

pub const FOOD_LABELS: LabelTable = LabelTable::new(&FOOD_CLASS_NAMES);
pub const FRUIT_LABELS: LabelTable = LabelTable::new(&FRUIT_CLASS_NAMES);
